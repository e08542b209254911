//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | Success                                                     |
//! | 1    | General error (unspecified)                                 |
//! | 2    | Usage error (bad arguments, missing layout)                 |
//! | 3    | Config error (unreadable, unparseable or invalid TOML)      |
//! | 4    | Input error (raw batch or pivot unreadable, rows too short) |
//! | 5    | Output error (pivot, result tables or archive not written)  |

use pcorr_mining::MiningError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config file missing, malformed, or failing validation.
pub const EXIT_CONFIG: u8 = 3;

/// Input could not be read or does not fit the configured layout.
pub const EXIT_INPUT: u8 = 4;

/// An output file could not be written, replaced, archived or removed.
pub const EXIT_OUTPUT: u8 = 5;

/// Exit code for an engine error raised while reading inputs or mining.
pub fn input_exit_code(err: &MiningError) -> u8 {
    match err {
        MiningError::ConfigParse(_) | MiningError::ConfigValidation(_) => EXIT_CONFIG,
        MiningError::FieldIndex { .. }
        | MiningError::LayoutMismatch { .. }
        | MiningError::ReservedToken { .. }
        | MiningError::PivotFormat(_)
        | MiningError::Io(_) => EXIT_INPUT,
        MiningError::LengthMismatch { .. } => EXIT_ERROR,
    }
}
