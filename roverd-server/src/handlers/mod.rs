pub mod apk;
pub mod autoconfig;
pub mod mitm;
