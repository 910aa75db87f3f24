pub mod device;
pub mod inspect;
pub mod run;
