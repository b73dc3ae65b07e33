//! Strongly typed, instance-scoped integer ids.
//!
//! Every configuration entity is keyed by a plain integer in the
//! relational store; the newtypes below keep them from being mixed up
//! at call sites.

use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl $name {
            pub fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// Partition root; every other entity carries it.
    InstanceId
);
int_id!(AreaId);
int_id!(DeviceId);
int_id!(DevicePoolId);
int_id!(WalkerId);
int_id!(WalkerAreaId);
int_id!(GeofenceId);
int_id!(RoutecalcId);
int_id!(AuthId);
int_id!(
    /// A leasable login credential row.
    AccountId
);
