//! Command-line interface for inspecting geosync spatial stores.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use geo::{Rect, coord};

mod error;
mod filter_sql;
mod fs;
mod query;

pub use error::CliError;

use filter_sql::FilterSqlArgs;
use query::QueryArgs;

pub(crate) const ARG_DATASET: &str = "dataset";
pub(crate) const ARG_BBOX: &str = "bbox";
pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ENV_FILTER_SQL_DATASET: &str = "GEOSYNC_CMDS_FILTER_SQL_DATASET";
pub(crate) const ENV_FILTER_SQL_BBOX: &str = "GEOSYNC_CMDS_FILTER_SQL_BBOX";
pub(crate) const ENV_QUERY_DATABASE: &str = "GEOSYNC_CMDS_QUERY_DATABASE";
pub(crate) const ENV_QUERY_DATASET: &str = "GEOSYNC_CMDS_QUERY_DATASET";
pub(crate) const ENV_QUERY_BBOX: &str = "GEOSYNC_CMDS_QUERY_BBOX";

/// Run the geosync CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Command::FilterSql(args) => filter_sql::run_filter_sql(args, &mut stdout),
        Command::Query(args) => query::run_query(args, &mut stdout),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "geosync",
    about = "Inspect layers written by the geosync engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the PostGIS SELECT for a bounding-box read.
    FilterSql(FilterSqlArgs),
    /// Read the features of a SQLite layer inside a bounding box.
    Query(QueryArgs),
}

/// Parse `minx,miny,maxx,maxy`.
pub(crate) fn parse_bbox(text: &str) -> Result<Rect<f64>, CliError> {
    let invalid = || CliError::InvalidBbox {
        value: text.to_owned(),
    };
    let ordinates = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    let [min_x, min_y, max_x, max_y] = ordinates.as_slice() else {
        return Err(invalid());
    };
    if ordinates.iter().any(|ordinate| !ordinate.is_finite()) {
        return Err(invalid());
    }
    Ok(Rect::new(
        coord! { x: *min_x, y: *min_y },
        coord! { x: *max_x, y: *max_y },
    ))
}

/// Split a comma-separated column list, dropping blanks.
pub(crate) fn parse_columns(text: Option<&str>) -> Vec<String> {
    text.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests;
