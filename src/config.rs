//! Harness configuration.
//!
//! Every variant of the harness (tracking granularity, memalign support,
//! malformed-trace policy) is one `HarnessConfig`, fixed at construction.

use crate::occupancy::Granularity;
use crate::trace::OpCode;
use std::env;

/// Default exclusive upper bound of size draws.
pub const DEFAULT_MAX_SIZE: usize = 2048;
/// Size substituted for a zero size draw on allocate.
pub const DEFAULT_MIN_SIZE: usize = 8;
/// `alignof(max_align_t)` on mainstream targets.
pub const DEFAULT_SCALAR_ALIGN: usize = if cfg!(target_pointer_width = "64") {
    16
} else {
    8
};

/// What to do with a trace byte that is not a recognized operation code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnknownBytePolicy {
    #[default]
    Skip,
    /// Treat it as a malformed trace.
    Reject,
}

/// What to do with a malformed trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Stop interpreting and report a negative status.
    #[default]
    Report,
    /// Abort like an allocator contract violation.
    Abort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    pub max_size: usize,
    pub min_size: usize,
    pub scalar_align: usize,
    pub granularity: Granularity,
    /// Whether `A` is part of the alphabet.
    pub aligned_ops: bool,
    pub unknown_bytes: UnknownBytePolicy,
    pub malformed: MalformedPolicy,
    /// Reject seeds whose bytes are operation codes.
    pub reject_seed_opcodes: bool,
    /// Report a null allocation as exhaustion instead of a violation.
    pub tolerate_null: bool,
    /// Record every decoded step and its draws.
    pub journal: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            max_size: DEFAULT_MAX_SIZE,
            min_size: DEFAULT_MIN_SIZE,
            scalar_align: DEFAULT_SCALAR_ALIGN,
            granularity: Granularity::Byte,
            aligned_ops: true,
            unknown_bytes: UnknownBytePolicy::Skip,
            malformed: MalformedPolicy::Report,
            reject_seed_opcodes: true,
            tolerate_null: false,
            journal: false,
        }
    }
}

impl HarnessConfig {
    /// Unknown bytes and malformed traces are both fatal.
    pub fn strict() -> Self {
        HarnessConfig {
            unknown_bytes: UnknownBytePolicy::Reject,
            malformed: MalformedPolicy::Abort,
            ..HarnessConfig::default()
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size.max(1);
        self
    }

    pub fn with_scalar_align(mut self, align: usize) -> Self {
        self.scalar_align = align.max(1).next_power_of_two();
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_aligned_ops(mut self, enabled: bool) -> Self {
        self.aligned_ops = enabled;
        self
    }

    pub fn with_unknown_bytes(mut self, policy: UnknownBytePolicy) -> Self {
        self.unknown_bytes = policy;
        self
    }

    pub fn with_malformed(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    pub fn with_tolerate_null(mut self, tolerate: bool) -> Self {
        self.tolerate_null = tolerate;
        self
    }

    pub fn with_journal(mut self, journal: bool) -> Self {
        self.journal = journal;
        self
    }

    /// Raise every bound to a value the harness can draw and check with.
    /// Fields set directly bypass the clamping of the `with_*` setters.
    pub fn normalized(self) -> Self {
        self.with_max_size(self.max_size)
            .with_min_size(self.min_size)
            .with_scalar_align(self.scalar_align)
    }

    /// The operation codes this configuration recognizes.
    pub fn alphabet(&self) -> &'static [OpCode] {
        if self.aligned_ops {
            &OpCode::ALL
        } else {
            &OpCode::BASIC
        }
    }

    pub fn decode(&self, byte: u8) -> Option<OpCode> {
        OpCode::from_byte(byte).filter(|op| self.alphabet().contains(op))
    }

    /// Defaults overlaid with `HANGOVER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = HarnessConfig::default();
        if let Some(max_size) = env_nonzero("HANGOVER_MAX_SIZE") {
            config.max_size = max_size;
        }
        if let Some(min_size) = env_nonzero("HANGOVER_MIN_SIZE") {
            config.min_size = min_size;
        }
        if let Ok(raw) = env::var("HANGOVER_GRANULARITY") {
            match raw.trim() {
                "byte" => config.granularity = Granularity::Byte,
                "word" => config.granularity = Granularity::Word,
                _ => log::warn!(
                    "ignoring HANGOVER_GRANULARITY={:?}: expected `byte` or `word`",
                    raw
                ),
            }
        }
        if env_flag("HANGOVER_STRICT") {
            config.unknown_bytes = UnknownBytePolicy::Reject;
            config.malformed = MalformedPolicy::Abort;
        }
        if env_flag("HANGOVER_NO_MEMALIGN") {
            config.aligned_ops = false;
        }
        if env_flag("HANGOVER_TOLERATE_NULL") {
            config.tolerate_null = true;
        }
        log::debug!("harness config: {:?}", config);
        config
    }
}

fn env_flag(key: &str) -> bool {
    env::var_os(key).is_some()
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not an unsigned integer", key, raw);
            None
        }
    }
}

fn env_nonzero(key: &str) -> Option<usize> {
    let value = env_usize(key)?;
    if value == 0 {
        log::warn!("ignoring {}=0", key);
        return None;
    }
    Some(value)
}
