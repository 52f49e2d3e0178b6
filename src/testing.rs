use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::RecoverableError;

/// Widest accepted `%Nd` placeholder
const MAX_WIDTH: usize = 32;

/// A printf-style file name pattern with exactly one integer placeholder
///
/// Accepted placeholders are `%d`, `%Nd` (space padded) and `%0Nd` (zero
/// padded); `%%` stands for a literal percent sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMask {
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl TestMask {
    pub fn parse(mask: &str) -> Result<Self, RecoverableError> {
        let invalid = |reason| RecoverableError::InvalidMask {
            mask: mask.to_string(),
            reason,
        };

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut placeholder = None;
        let mut chars = mask.chars().peekable();

        while let Some(c) = chars.next() {
            let target = if placeholder.is_some() {
                &mut suffix
            } else {
                &mut prefix
            };
            if c != '%' {
                target.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                target.push('%');
                continue;
            }
            if placeholder.is_some() {
                return Err(invalid("more than one placeholder"));
            }

            let zero_pad = chars.next_if_eq(&'0').is_some();
            let mut digits = String::new();
            while let Some(d) = chars.next_if(char::is_ascii_digit) {
                digits.push(d);
            }
            if chars.next() != Some('d') {
                return Err(invalid("unsupported placeholder"));
            }
            let width = if digits.is_empty() {
                0
            } else {
                digits.parse().unwrap_or(usize::MAX)
            };
            if width > MAX_WIDTH {
                return Err(invalid("placeholder width is too large"));
            }
            placeholder = Some((width, zero_pad));
        }

        let (width, zero_pad) = placeholder.ok_or_else(|| invalid("no placeholder"))?;
        Ok(Self {
            prefix,
            suffix,
            width,
            zero_pad,
        })
    }

    /// File name of test `number`
    pub fn format(&self, number: u32) -> String {
        let index = if self.zero_pad {
            format!("{number:0width$}", width = self.width)
        } else {
            format!("{number:>width$}", width = self.width)
        };
        format!("{}{index}{}", self.prefix, self.suffix)
    }
}

impl fmt::Display for TestMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escape = |s: &str| s.replace('%', "%%");
        let zero = if self.zero_pad { "0" } else { "" };
        let width = if self.width > 0 {
            self.width.to_string()
        } else {
            String::new()
        };
        write!(
            f,
            "{}%{zero}{width}d{}",
            escape(&self.prefix),
            escape(&self.suffix)
        )
    }
}

/// One test of a problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub number: u32,
    pub input: PathBuf,
    /// Reference answer; `None` when the problem has no output mask
    pub answer: Option<PathBuf>,
}

/// Lists tests 1, 2, ... for as long as the input file exists
pub fn enumerate_tests(
    problem_dir: &Path,
    mask_in: &str,
    mask_out: &str,
) -> Result<Vec<TestCase>, RecoverableError> {
    let mask_in = TestMask::parse(mask_in)?;
    let mask_out = if mask_out.is_empty() {
        None
    } else {
        Some(TestMask::parse(mask_out)?)
    };

    let mut tests = Vec::new();
    for number in 1.. {
        let input = problem_dir.join(mask_in.format(number));
        if !input.is_file() {
            break;
        }
        tests.push(TestCase {
            number,
            input,
            answer: mask_out
                .as_ref()
                .map(|mask| problem_dir.join(mask.format(number))),
        });
    }

    if tests.is_empty() {
        return Err(RecoverableError::NoTests(
            problem_dir.join(mask_in.to_string()).display().to_string(),
        ));
    }
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mask_formats() {
        assert_eq!(TestMask::parse("%d").unwrap().format(7), "7");
        assert_eq!(TestMask::parse("%02d").unwrap().format(7), "07");
        assert_eq!(TestMask::parse("%02d").unwrap().format(123), "123");
        assert_eq!(TestMask::parse("%3d.in").unwrap().format(5), "  5.in");
        assert_eq!(TestMask::parse("tests/%03d.a").unwrap().format(12), "tests/012.a");
        assert_eq!(TestMask::parse("100%%-%d").unwrap().format(1), "100%-1");
    }

    #[test]
    fn test_mask_display_round_trips() {
        for mask in ["%02d", "in%d.txt", "%%%3d%%"] {
            assert_eq!(TestMask::parse(mask).unwrap().to_string(), mask);
        }
    }

    #[test]
    fn test_invalid_masks() {
        for (mask, reason) in [
            ("input.txt", "no placeholder"),
            ("%d-%d", "more than one placeholder"),
            ("%s", "unsupported placeholder"),
            ("%2", "unsupported placeholder"),
            ("100%%", "no placeholder"),
            ("%0999999999d", "placeholder width is too large"),
            ("%33d.in", "placeholder width is too large"),
        ] {
            match TestMask::parse(mask) {
                Err(RecoverableError::InvalidMask { reason: r, .. }) => assert_eq!(r, reason, "{mask}"),
                other => panic!("{mask}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_enumeration_stops_at_first_gap() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["01", "01.a", "02", "02.a", "04", "04.a"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let tests = enumerate_tests(dir.path(), "%02d", "%02d.a").unwrap();
        assert_eq!(
            tests,
            vec![
                TestCase {
                    number: 1,
                    input: dir.path().join("01"),
                    answer: Some(dir.path().join("01.a")),
                },
                TestCase {
                    number: 2,
                    input: dir.path().join("02"),
                    answer: Some(dir.path().join("02.a")),
                },
            ]
        );
    }

    #[test]
    fn test_empty_output_mask() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.in"), "").unwrap();

        let tests = enumerate_tests(dir.path(), "%d.in", "").unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].answer, None);
    }

    #[test]
    fn test_no_tests() {
        let dir = tempfile::tempdir().unwrap();
        let err = enumerate_tests(dir.path(), "%02d", "%02d.a").unwrap_err();
        assert!(matches!(err, RecoverableError::NoTests(_)));
    }
}
