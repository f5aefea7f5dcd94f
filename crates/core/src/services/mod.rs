pub mod cascade;
pub mod clock;
pub mod day_series;
pub mod history_service;
pub mod prewarm;
