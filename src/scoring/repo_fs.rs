//! Static feature-importance list exported next to the model.
//!
//! Used as the explanation when the model does not return per-request contributions.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::common::error::ChurnResult;
use crate::metrics::domain::split_csv_line;

use super::domain::{FeatureContribution, TopFeatures};

/// Load the ranked importance CSV at `path`.
///
/// The header must name a `feature` (or `Feature`) column; an `importance` column is
/// optional and defaults to `0.0`. Row order is kept as the ranking. A missing file, or one
/// without a feature column, is an empty list. Unparseable rows are skipped.
pub fn load_feature_importance(path: &Path) -> ChurnResult<TopFeatures> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(
                event = "feature_importance_missing",
                path = %path.display(),
            );
            return Ok(TopFeatures::default());
        }
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            warn!(
                event = "feature_importance_unreadable",
                path = %path.display(),
                error = %err,
            );
            return Ok(TopFeatures::default());
        }
        Err(err) => return Err(err.into()),
    };

    let top = parse_feature_importance(&body);
    info!(
        event = "feature_importance_loaded",
        path = %path.display(),
        features = top.len(),
    );
    Ok(top)
}

fn parse_feature_importance(body: &str) -> TopFeatures {
    let mut lines = body
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let header = match lines.next().map(|(_, h)| split_csv_line(h)) {
        Some(Ok(cells)) => cells,
        Some(Err(err)) => {
            warn!(event = "feature_importance_bad_header", error = %err);
            return TopFeatures::default();
        }
        None => return TopFeatures::default(),
    };

    let Some(feature_col) = header
        .iter()
        .position(|c| c.trim() == "feature" || c.trim() == "Feature")
    else {
        warn!(event = "feature_importance_bad_header", "no feature column");
        return TopFeatures::default();
    };
    let importance_col = header
        .iter()
        .position(|c| c.trim().eq_ignore_ascii_case("importance"));

    let mut rows = Vec::new();
    for (i, line) in lines {
        match parse_row(line, feature_col, importance_col) {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => {}
            Err(err) => warn!(
                event = "feature_importance_row_skipped",
                line = i + 1,
                error = %err,
            ),
        }
    }
    TopFeatures::from_ranked(rows)
}

fn parse_row(
    line: &str,
    feature_col: usize,
    importance_col: Option<usize>,
) -> Result<Option<FeatureContribution>, String> {
    let cells = split_csv_line(line).map_err(|err| err.to_string())?;
    let Some(name) = cells.get(feature_col).map(|n| n.trim()).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let contribution = match importance_col.and_then(|c| cells.get(c)).map(|v| v.trim()) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<f64>()
            .map_err(|_| format!("importance is not a number: {raw}"))?,
        _ => 0.0,
    };
    Ok(Some(FeatureContribution::new(name, contribution)))
}
