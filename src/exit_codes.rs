//! Exit code constants for the codemend CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config or skill file)
//! - 2: Healing failure (artifact unrecoverable)
//! - 3: Sandbox failure (timeout, contract violation, runtime fault)
//! - 4: Generation failure (service unreachable or rejected the request)
//! - 5: Experiment incomplete (attempts dispatched but not recorded)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unreadable files, or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Healing failure: the artifact could not be brought into a parseable shape.
pub const HEAL_FAILURE: i32 = 2;

/// Sandbox failure: the healed artifact timed out, faulted, or broke the contract.
pub const SANDBOX_FAILURE: i32 = 3;

/// Generation failure: the text-generation service did not return an artifact.
pub const GENERATION_FAILURE: i32 = 4;

/// Experiment incomplete: some dispatched attempts never reached the metrics record.
pub const EXPERIMENT_INCOMPLETE: i32 = 5;
