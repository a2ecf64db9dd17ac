//! Progress lines emitted through `--progress-template`
//!
//! The process layer forwards these verbatim; callers that want a progress
//! bar parse them here.

/// Marker placed at the start of every progress line
pub const PROGRESS_TAG: &str = "[yt-dlp]";

/// Template handed to the downloader: tag, percent, eta, downloaded, total, speed, eta seconds
pub const PROGRESS_TEMPLATE: &str = concat!(
    "[yt-dlp],",
    "%(progress._percent_str)s,",
    "%(progress._eta_str)s,",
    "%(progress.downloaded_bytes)s,",
    "%(progress.total_bytes)s,",
    "%(progress.speed)s,",
    "%(progress.eta)s"
);

/// One parsed progress tick. Fields the downloader reports as `NA` are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressTick {
    /// 0.0 ..= 100.0
    pub percent: Option<f64>,
    /// Human readable, e.g. "00:42"
    pub eta: String,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    pub eta_seconds: Option<u64>,
}

impl ProgressTick {
    /// Parse a progress line; returns `None` for any other output
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 7 || fields[0] != PROGRESS_TAG {
            return None;
        }

        Some(Self {
            percent: fields[1].trim_end_matches('%').trim().parse().ok(),
            eta: fields[2].to_string(),
            downloaded_bytes: parse_number(fields[3]).map(|n| n as u64),
            total_bytes: parse_number(fields[4]).map(|n| n as u64),
            speed: parse_number(fields[5]),
            eta_seconds: parse_number(fields[6]).map(|n| n as u64),
        })
    }
}

fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick() {
        let tick =
            ProgressTick::parse("[yt-dlp],  42.5%,00:13,1048576,2097152,524288.5,13").unwrap();

        assert_eq!(tick.percent, Some(42.5));
        assert_eq!(tick.eta, "00:13");
        assert_eq!(tick.downloaded_bytes, Some(1_048_576));
        assert_eq!(tick.total_bytes, Some(2_097_152));
        assert_eq!(tick.speed, Some(524_288.5));
        assert_eq!(tick.eta_seconds, Some(13));
    }

    #[test]
    fn test_parse_unknown_fields() {
        let tick = ProgressTick::parse("[yt-dlp],100.0%,Unknown,5000,NA,NA,NA").unwrap();
        assert_eq!(tick.total_bytes, None);
        assert_eq!(tick.speed, None);
        assert_eq!(tick.eta_seconds, None);
    }

    #[test]
    fn test_parse_rejects_other_lines() {
        assert!(ProgressTick::parse("[download] Destination: a.mp4").is_none());
        assert!(ProgressTick::parse("[youtube] abc: Downloading webpage").is_none());
    }
}
