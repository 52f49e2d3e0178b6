use crate::error::RecoverableError;
use crate::models::Verdict;

/// Run statistics reported by an `ejudge-execute` compatible sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub verdict: Verdict,
    pub cpu_time_ms: u64,
    pub real_time_ms: u64,
    /// `VMSize` converted from bytes to kilobytes
    pub memory_kb: u64,
}

/// Parses the `Key: value` lines the sandbox writes to its diagnostic stream
///
/// Unknown keys and lines without a `": "` separator are skipped. A missing or
/// unknown `Status`, or a numeric field that is not an integer, makes the whole
/// report unusable.
pub fn parse_report(text: &str) -> Result<Report, RecoverableError> {
    let mut verdict = None;
    let mut cpu_time_ms = 0;
    let mut real_time_ms = 0;
    let mut vm_size = 0;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        let value = value.trim_end();

        match key {
            "Status" => {
                verdict = Some(Verdict::from_sandbox_status(value).ok_or_else(|| {
                    RecoverableError::Protocol(format!("unknown Status: {value}"))
                })?);
            }
            "CPUTime" => cpu_time_ms = parse_number(key, value)?,
            "RealTime" => real_time_ms = parse_number(key, value)?,
            "VMSize" => vm_size = parse_number(key, value)?,
            _ => {}
        }
    }

    let verdict = verdict.ok_or_else(|| RecoverableError::Protocol("no Status".to_string()))?;

    Ok(Report {
        verdict,
        cpu_time_ms,
        real_time_ms,
        memory_kb: vm_size >> 10,
    })
}

fn parse_number(key: &str, value: &str) -> Result<u64, RecoverableError> {
    value
        .parse()
        .map_err(|_| RecoverableError::Protocol(format!("malformed {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_limit_report() {
        let report = parse_report("Status: TL\nCPUTime: 900\nVMSize: 65536\n").unwrap();
        assert_eq!(report.verdict, Verdict::TimeLimit);
        assert_eq!(report.cpu_time_ms, 900);
        assert_eq!(report.real_time_ms, 0);
        assert_eq!(report.memory_kb, 64);
    }

    #[test]
    fn test_full_report_with_noise() {
        let text = "ejudge-execute 3.8\nStatus: OK\nCPUTime: 12\nRealTime: 40\nVMSize: 10485760\nExitCode: 0\n";
        let report = parse_report(text).unwrap();
        assert_eq!(
            report,
            Report {
                verdict: Verdict::Ok,
                cpu_time_ms: 12,
                real_time_ms: 40,
                memory_kb: 10240,
            }
        );
    }

    #[test]
    fn test_missing_status() {
        let err = parse_report("CPUTime: 10\n").unwrap_err();
        assert!(matches!(err, RecoverableError::Protocol(_)));
    }

    #[test]
    fn test_unknown_status() {
        let err = parse_report("Status: WA\n").unwrap_err();
        assert_eq!(err.to_string(), "sandbox protocol error: unknown Status: WA");
    }

    #[test]
    fn test_malformed_number() {
        let err = parse_report("Status: OK\nCPUTime: 1.5\n").unwrap_err();
        assert_eq!(err.to_string(), "sandbox protocol error: malformed CPUTime: 1.5");
    }
}
