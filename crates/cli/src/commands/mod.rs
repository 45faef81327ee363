pub mod ask;
pub mod migrate;
pub mod onboard;
pub mod providers;
pub mod serve;
