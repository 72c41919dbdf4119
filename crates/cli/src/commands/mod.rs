pub mod engine;
pub mod run;
pub mod start;
pub mod status;
pub mod stop;
