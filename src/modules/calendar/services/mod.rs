pub mod period_calendar;

pub use period_calendar::PeriodCalendar;
