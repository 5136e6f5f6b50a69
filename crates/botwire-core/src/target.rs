//! Logical destination parsing.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WireError};

/// A parsed send destination.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Direct message to a user.
    Private(i64),
    /// Group chat.
    Group(i64),
    /// Guild channel.
    Guild {
        /// Guild id.
        guild_id: String,
        /// Channel id within the guild.
        channel_id: String,
    },
}

impl Target {
    /// Parse a destination string.
    ///
    /// Grammar: `private:<digits>` | `group:<digits>` | `guild:<id>:<id>`
    /// | bare `<digits>` (implicit private).
    pub fn parse(dest: &str) -> Result<Self> {
        let err = || WireError::TargetParse { input: dest.into() };

        if let Some(rest) = dest.strip_prefix("group:") {
            return rest.parse().map(Target::Group).map_err(|_| err());
        }
        if let Some(rest) = dest.strip_prefix("private:") {
            return rest.parse().map(Target::Private).map_err(|_| err());
        }
        if let Some(rest) = dest.strip_prefix("guild:") {
            let (guild_id, channel_id) = rest.split_once(':').ok_or_else(err)?;
            if guild_id.is_empty() || channel_id.is_empty() || channel_id.contains(':') {
                return Err(err());
            }
            return Ok(Target::Guild {
                guild_id: guild_id.to_string(),
                channel_id: channel_id.to_string(),
            });
        }
        dest.parse().map(Target::Private).map_err(|_| err())
    }

    /// Parse after stripping an optional external routing prefix
    /// (e.g. `qq:group:123` with prefix `qq` parses as `group:123`).
    pub fn parse_prefixed(dest: &str, prefix: &str) -> Result<Self> {
        let stripped = dest
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(dest);
        Self::parse(stripped)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_target() {
        assert_eq!(Target::parse("group:123").unwrap(), Target::Group(123));
    }

    #[test]
    fn guild_target() {
        assert_eq!(
            Target::parse("guild:9:4").unwrap(),
            Target::Guild {
                guild_id: "9".into(),
                channel_id: "4".into()
            }
        );
    }

    #[test]
    fn private_explicit_and_bare_identical() {
        let explicit = Target::parse("private:55").unwrap();
        let bare = Target::parse("55").unwrap();
        assert_eq!(explicit, bare);
        assert_eq!(explicit, Target::Private(55));
    }

    #[test]
    fn malformed_group_errors_with_input() {
        let err = Target::parse("group:abc").unwrap_err();
        assert!(err.to_string().contains("group:abc"));
    }

    #[test]
    fn malformed_guild_errors() {
        assert!(Target::parse("guild:9").is_err());
        assert!(Target::parse("guild::4").is_err());
        assert!(Target::parse("guild:9:").is_err());
        assert!(Target::parse("guild:9:4:5").is_err());
    }

    #[test]
    fn non_numeric_bare_errors() {
        assert!(Target::parse("bogus").is_err());
        assert!(Target::parse("").is_err());
    }

    #[test]
    fn external_prefix_stripped() {
        let prefixed = Target::parse_prefixed("qq:group:123", "qq").unwrap();
        assert_eq!(prefixed, Target::parse("group:123").unwrap());
    }

    #[test]
    fn prefix_absent_still_parses() {
        let t = Target::parse_prefixed("group:5", "qq").unwrap();
        assert_eq!(t, Target::Group(5));
    }

    #[test]
    fn negative_ids_accepted() {
        // Some gateways hand out negative ids; the grammar does not forbid them.
        assert_eq!(Target::parse("-7").unwrap(), Target::Private(-7));
    }
}
