use crate::recurrence::WeekdayLabels;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn weekday_labels(&self) -> WeekdayLabels;
}
