//! Parses and validates the channel table the server is started with.
//!
//! One non-empty line per channel, space-separated fields, fail the whole
//! process on the first bad line. Every rule is checked against the line
//! that violates it rather than retroactively against lines parsed later,
//! so the error reported always names the line that actually broke a
//! rule (see `DESIGN.md` for the rationale).

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// One validated line of the channel configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub name: String,
    pub port: u16,
    pub capacity: usize,
}

/// Minimum number of clients a channel must be able to hold.
pub const MIN_CAPACITY: i64 = 5;

/// Minimum number of channels a valid config file must define.
pub const MIN_CHANNELS: usize = 3;

/// Loads and validates the channel table at `path`.
///
/// Returns the first [`ConfigError`] encountered; the caller is expected to
/// treat any error here as fatal and exit without starting any channel.
pub fn load(path: &Path) -> Result<Vec<ChannelConfig>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut channels = Vec::new();
    let mut seen_names = HashSet::new();
    let mut seen_ports = HashSet::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let line_no = idx + 1;
        let malformed = || ConfigError::Malformed {
            path: path.display().to_string(),
            line: line_no,
            text: line.to_string(),
        };

        let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.len() != 4 {
            return Err(malformed());
        }

        let name = tokens[1].to_string();
        let port: u16 = tokens[2].parse().map_err(|_| malformed())?;
        let capacity: i64 = tokens[3].parse().map_err(|_| malformed())?;

        if port == 0 {
            return Err(ConfigError::PortNotPositive {
                path: path.display().to_string(),
                line: line_no,
            });
        }

        if name.is_empty() || name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(ConfigError::NameStartsWithDigit {
                path: path.display().to_string(),
                line: line_no,
                name,
            });
        }

        if capacity < MIN_CAPACITY {
            return Err(ConfigError::CapacityTooSmall {
                path: path.display().to_string(),
                line: line_no,
                capacity,
            });
        }

        if !seen_names.insert(name.clone()) {
            return Err(ConfigError::DuplicateName { name });
        }
        if !seen_ports.insert(port) {
            return Err(ConfigError::DuplicatePort { port });
        }

        channels.push(ChannelConfig {
            name,
            port,
            capacity: capacity as usize,
        });
    }

    if channels.len() < MIN_CHANNELS {
        return Err(ConfigError::TooFewChannels {
            found: channels.len(),
        });
    }

    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_a_valid_table() {
        let f = write_config(
            "channel common 9001 5\nchannel second 9002 10\nchannel third 9003 20\n",
        );
        let channels = load(f.path()).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].name, "common");
        assert_eq!(channels[0].port, 9001);
        assert_eq!(channels[0].capacity, 5);
    }

    #[test]
    fn rejects_fewer_than_three_channels() {
        let f = write_config("channel common 9001 5\nchannel second 9002 10\n");
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TooFewChannels { found: 2 }));
    }

    #[test]
    fn rejects_capacity_below_minimum() {
        let f = write_config(
            "channel common 9001 4\nchannel second 9002 10\nchannel third 9003 20\n",
        );
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::CapacityTooSmall { capacity: 4, .. }));
    }

    #[test]
    fn rejects_a_zero_port() {
        let f = write_config(
            "channel common 0 5\nchannel second 9002 10\nchannel third 9003 20\n",
        );
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::PortNotPositive { .. }));
    }

    #[test]
    fn rejects_name_starting_with_a_digit() {
        let f = write_config(
            "channel 1common 9001 5\nchannel second 9002 10\nchannel third 9003 20\n",
        );
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NameStartsWithDigit { .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let f = write_config(
            "channel common 9001 5\nchannel common 9002 10\nchannel third 9003 20\n",
        );
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }

    #[test]
    fn rejects_duplicate_ports() {
        let f = write_config(
            "channel common 9001 5\nchannel second 9001 10\nchannel third 9003 20\n",
        );
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePort { port: 9001 }));
    }

    #[test]
    fn rejects_malformed_lines() {
        let f = write_config("channel common 9001\nchannel second 9002 10\nchannel third 9003 20\n");
        let err = load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn ignores_blank_lines() {
        let f = write_config(
            "channel common 9001 5\n\nchannel second 9002 10\nchannel third 9003 20\n\n",
        );
        assert_eq!(load(f.path()).unwrap().len(), 3);
    }
}
