// Copyright 2025 The clustermanager Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Go-style duration strings (`30s`, `1h30m`, `1.5h`, `300ms`, `10us`), the format used by
//! `metav1.Duration` fields in Kubernetes manifests.

use std::time::Duration;

/// Parses a Go `time.ParseDuration` string. Negative durations are rejected.
pub fn parse_go_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let nanos = go_parse_duration::parse_duration(s)
        .map_err(|e| format!("invalid duration '{}': {:?}", s, e))?;
    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .map_err(|_| format!("duration '{}' must not be negative", s))
}

/// Human-readable rendering for logs, e.g. `1h 30m` or `45s`.
pub fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_go_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_go_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_go_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_go_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_go_duration("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_go_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_go_duration("2h0m30s"), Ok(Duration::from_secs(7230)));
        assert_eq!(
            parse_go_duration("1m500ms"),
            Ok(Duration::from_millis(60_500))
        );
    }

    #[test]
    fn test_parse_fractional() {
        assert_eq!(parse_go_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(
            parse_go_duration("1m0.5s"),
            Ok(Duration::from_millis(60_500))
        );
    }

    #[test]
    fn test_parse_sub_millisecond_units() {
        assert_eq!(parse_go_duration("300ns"), Ok(Duration::from_nanos(300)));
        assert_eq!(parse_go_duration("1us"), Ok(Duration::from_micros(1)));
        assert_eq!(parse_go_duration("20µs"), Ok(Duration::from_micros(20)));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_go_duration("").is_err());
        assert!(parse_go_duration("s").is_err());
        assert!(parse_go_duration("10").is_err());
        assert!(parse_go_duration("10d").is_err());
        assert!(parse_go_duration("-5s").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
