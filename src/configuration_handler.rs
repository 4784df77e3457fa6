use crate::{configuration::Configuration, recurrence::WeekdayLabels};
use clap::Parser;

/// Scheduling service for coaches and their students.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct ConfigurationHandler {
    /// Port the HTTP server listens on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: String,

    /// PostgreSQL connection URL. Appointments are kept in memory when omitted
    #[arg(short, long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Language of the weekday names attached to replicated appointments
    #[arg(
        short,
        long,
        env = "WEEKDAY_LABELS",
        value_enum,
        default_value_t = WeekdayLabels::Portuguese
    )]
    weekday_labels: WeekdayLabels,
}

impl ConfigurationHandler {
    /// Reads `.env` (if present), then the command line and environment.
    pub fn parse_arguments() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> String {
        self.port.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn weekday_labels(&self) -> WeekdayLabels {
        self.weekday_labels
    }
}
