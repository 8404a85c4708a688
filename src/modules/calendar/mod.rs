pub mod services;

pub use services::PeriodCalendar;
