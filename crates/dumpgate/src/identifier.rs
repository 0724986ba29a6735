//! Composite artifact identifier parsing.
//!
//! Heap dumps collected by the capture pipeline are addressed by a composite
//! key instead of a database row:
//!
//! ```text
//! s3!<instance-id>!<command-id>!<pid>
//! ```
//!
//! Anything that does not have this shape is not an error here: callers use
//! [`ResourceIdentifier::parse`] to pick between the composite and the plain
//! addressing scheme.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{AccessError, AccessResult};

/// Scheme tag of composite identifiers.
pub const COMPOSITE_SCHEME: &str = "s3";

/// Field delimiter of composite identifiers.
pub const DELIMITER: char = '!';

static SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-z-]+$").expect("valid regex"));

/// Parsed composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentifier {
    instance_id: String,
    command_id: String,
    pid: u64,
}

impl ResourceIdentifier {
    /// Parse a composite identifier.
    ///
    /// Returns `None` for anything that is not `s3!<id>!<cmd>!<pid>` with
    /// `id` and `cmd` matching `[0-9a-z-]+` and `pid` a non-negative 64-bit
    /// integer.
    ///
    /// # Examples
    ///
    /// ```
    /// use dumpgate::ResourceIdentifier;
    ///
    /// let id = ResourceIdentifier::parse("s3!i-0abc!5f1c-77!4242").unwrap();
    /// assert_eq!(id.instance_id(), "i-0abc");
    /// assert_eq!(id.pid(), 4242);
    ///
    /// assert!(ResourceIdentifier::parse("myfile").is_none());
    /// assert!(ResourceIdentifier::parse("s3!I-0ABC!cmd!1").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        Self::parse_fields(raw).ok()
    }

    /// Parse a name that must be a composite identifier.
    pub fn parse_required(raw: &str) -> AccessResult<Self> {
        Self::parse_fields(raw).map_err(|reason| AccessError::MalformedIdentifier {
            name: raw.to_string(),
            reason: reason.to_string(),
        })
    }

    fn parse_fields(raw: &str) -> Result<Self, &'static str> {
        let parts: Vec<&str> = raw.split(DELIMITER).collect();

        if parts.len() != 4 {
            return Err("expected 4 '!'-separated fields");
        }
        if parts[0] != COMPOSITE_SCHEME {
            return Err("scheme must be 's3'");
        }
        if !SEGMENT.is_match(parts[1]) {
            return Err("instance id must match [0-9a-z-]+");
        }
        if !SEGMENT.is_match(parts[2]) {
            return Err("command id must match [0-9a-z-]+");
        }

        let pid = parts[3]
            .parse::<i64>()
            .ok()
            .and_then(|pid| u64::try_from(pid).ok())
            .ok_or("pid must be a non-negative integer")?;

        Ok(Self {
            instance_id: parts[1].to_string(),
            command_id: parts[2].to_string(),
            pid,
        })
    }

    pub fn scheme(&self) -> &'static str {
        COMPOSITE_SCHEME
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn pid(&self) -> u64 {
        self.pid
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            COMPOSITE_SCHEME,
            self.instance_id,
            self.command_id,
            self.pid,
            d = DELIMITER
        )
    }
}
