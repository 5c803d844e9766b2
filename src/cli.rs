//! The CLI for `bst`.

use crate::{
    config::{config_path, Config},
    errors::BstError,
    filter::{filter, DivergenceFilter, FilterCriteria, StatusFilter},
    gerrit::GerritClient,
    git::{active_repository, repository_paths, LocalMetadataReader, SystemGit},
    record::Assembler,
    sort::{sort, Direction, SortField},
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{
    builder::styling::{AnsiColor, Color, Style},
    ArgAction, Parser,
};
use std::sync::Arc;
use tracing::Level;

const ABOUT: &str =
    "bst lists local branches alongside the state of their changes on the review server.";

/// The CLI application for `bst`.
#[derive(Parser, Debug, Clone, Eq, PartialEq)]
#[command(about = ABOUT, version, styles = cli_styles())]
pub struct Cli {
    /// Verbosity level (0-4)
    #[arg(short, action = ArgAction::Count)]
    pub v: u8,
    /// Field to sort by. Defaults to the configured field, or the branch name.
    #[arg(long, value_enum)]
    pub sort: Option<SortField>,
    /// Sort in descending order.
    #[arg(long, conflicts_with = "asc")]
    pub desc: bool,
    /// Sort in ascending order.
    #[arg(long)]
    pub asc: bool,
    /// Only show branches with one of these statuses.
    #[arg(long = "status", value_enum)]
    pub statuses: Vec<StatusFilter>,
    /// Only show branches committed at or after this date (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_date)]
    pub since: Option<DateTime<Utc>>,
    /// Only show branches committed before this date (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_date)]
    pub until: Option<DateTime<Utc>>,
    /// Only show branches that diverged in one of these directions.
    #[arg(long = "diverged", value_enum)]
    pub divergence: Vec<DivergenceFilter>,
    /// Do not contact the review server.
    #[arg(long)]
    pub local_only: bool,
}

impl Cli {
    /// Run the CLI application with the given arguments.
    pub async fn run(self) -> Result<()> {
        // Resolve the repository before anything else; nothing is attempted outside of one.
        let (workdir, git_dir) = {
            let repo = active_repository().ok_or(BstError::NotARepository)?;
            repository_paths(&repo)
        };
        let config = Config::load(&config_path(&git_dir))?;

        // Read all local metadata in bulk.
        let reader = LocalMetadataReader::new(Arc::new(SystemGit::new(workdir)));
        let metadata = reader.read().await?;

        // Join with the review server, unless asked not to.
        let client = GerritClient::new(config.remote.max_in_flight);
        let assembler = if self.local_only {
            Assembler::local_only()
        } else {
            Assembler::new(&client)
        };
        let records = assembler.assemble(metadata).await;
        tracing::info!(records = records.len(), "assembled branch records");

        // Filter and sort, with flags taking precedence over the config.
        let records = filter(records, &self.criteria());
        let field = self.sort.unwrap_or(config.display.sort);
        let direction = match (self.desc, self.asc) {
            (true, _) => Direction::Descending,
            (_, true) => Direction::Ascending,
            _ => config.display.direction(),
        };
        let records = sort(records, field, direction);

        let mut buf = String::new();
        for record in &records {
            record.write_line(&mut buf)?;
        }
        print!("{}", buf);

        Ok(())
    }

    /// Assembles the [FilterCriteria] requested on the command line.
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            statuses: self.statuses.clone(),
            since: self.since,
            until: self.until,
            divergence: self.divergence.clone(),
        }
    }

    /// Initializes the tracing subscriber
    ///
    /// # Returns
    /// - `Result<()>` - Ok if successful, Err otherwise.
    pub(crate) fn init_tracing_subscriber(self) -> Result<Self> {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match self.v {
                0 => Level::ERROR,
                1 => Level::WARN,
                2 => Level::INFO,
                3 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))?;

        Ok(self)
    }
}

/// Parses a date given on the command line, either as a bare date (midnight UTC) or as an
/// RFC 3339 instant.
fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| format!("invalid date `{raw}`"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid date `{raw}`: {e}"))
}

/// Styles for the CLI application.
const fn cli_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
