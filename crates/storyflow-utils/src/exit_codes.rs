//! Exit code constants for the storyflow CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Artifact produced |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CONFIGURATION` | Invalid CLI arguments or configuration |
//! | 3 | `QUALITY_EXHAUSTED` | Every candidate was rejected |
//! | 10 | `TIMEOUT` | Request deadline elapsed |
//! | 70 | `BACKEND_FAILURE` | Transport retries exhausted |
//! | 74 | `PERSISTENCE` | Accepted artifact could not be saved |
//! | 130 | `CANCELLED` | Request cancelled |

/// Type-safe process exit code.
///
/// The numeric values are part of the CLI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    pub const INTERNAL: ExitCode = ExitCode(1);

    pub const CONFIGURATION: ExitCode = ExitCode(2);

    pub const QUALITY_EXHAUSTED: ExitCode = ExitCode(3);

    pub const TIMEOUT: ExitCode = ExitCode(10);

    pub const BACKEND_FAILURE: ExitCode = ExitCode(70);

    pub const PERSISTENCE: ExitCode = ExitCode(74);

    pub const CANCELLED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ExitCode::SUCCESS,
            ExitCode::INTERNAL,
            ExitCode::CONFIGURATION,
            ExitCode::QUALITY_EXHAUSTED,
            ExitCode::TIMEOUT,
            ExitCode::BACKEND_FAILURE,
            ExitCode::PERSISTENCE,
            ExitCode::CANCELLED,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(i32::from(ExitCode::BACKEND_FAILURE), 70);
    }
}
