//! Endpoint registry: maps a notification source to a logical channel.
//!
//! Depending on the platform BLE stack, the sending characteristic of a
//! notification is reported either as a numeric ATT handle or as its 128-bit
//! UUID.  Handles are cheap to compare but the firmware has renumbered them
//! across hardware revisions, so every channel carries a list of known
//! handles alongside its UUID and both forms are accepted.

use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::{
    COMMAND, COMMAND_CHARACTERISTIC, LONG_PATH, LONG_PATH_CHARACTERISTIC, SHORT_PATH,
    SHORT_PATH_CHARACTERISTIC,
};

// ── Source ───────────────────────────────────────────────────────────────────

/// The sender of a notification, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Transport-assigned ATT handle.
    Handle(u16),
    /// Characteristic UUID in string form (any case).
    Identifier(String),
}

impl From<u16> for Source {
    fn from(handle: u16) -> Self {
        Source::Handle(handle)
    }
}

impl From<Uuid> for Source {
    fn from(uuid: Uuid) -> Self {
        Source::Identifier(uuid.to_string())
    }
}

impl From<&str> for Source {
    fn from(id: &str) -> Self {
        Source::Identifier(id.to_owned())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Handle(h) => write!(f, "handle {h}"),
            Source::Identifier(id) => write!(f, "{id}"),
        }
    }
}

// ── ChannelDescriptor ─────────────────────────────────────────────────────────

/// Static description of one GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// Channel name carried into every decoded sample.
    pub name: String,
    /// Characteristic UUID.
    pub stable_id: Uuid,
    /// Known ATT handles.  `None` marks a write-only characteristic whose
    /// handle was never observed in a notification.
    pub handles: Vec<Option<u16>>,
}

impl ChannelDescriptor {
    pub fn new(name: impl Into<String>, stable_id: Uuid, handles: Vec<Option<u16>>) -> Self {
        Self {
            name: name.into(),
            stable_id,
            handles,
        }
    }

    fn has_handle(&self, handle: u16) -> bool {
        self.handles.contains(&Some(handle))
    }

    fn has_identifier(&self, id: &str) -> bool {
        // Uuid's Display is lowercase hyphenated; compare ignoring case so that
        // "2F2E2D2C-…" from Windows stacks still matches.
        let mut buf = Uuid::encode_buffer();
        let own = self.stable_id.hyphenated().encode_lower(&mut buf);
        own.eq_ignore_ascii_case(id.trim())
    }

    fn matches(&self, source: &Source) -> bool {
        match source {
            Source::Handle(h) => self.has_handle(*h),
            Source::Identifier(id) => self.has_identifier(id),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Ordered channel table.
///
/// Resolution scans channels in declaration order and returns the first
/// match.  Construction guarantees that no populated handle belongs to two
/// channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    channels: Vec<ChannelDescriptor>,
}

impl Registry {
    /// Build a registry from `channels`, in the given order.
    ///
    /// Fails with [`Error::DuplicateHandle`] if a handle appears under two
    /// different channels.
    pub fn new(channels: Vec<ChannelDescriptor>) -> Result<Self> {
        let registry = Self { channels };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        for (i, a) in self.channels.iter().enumerate() {
            for b in &self.channels[i + 1..] {
                if let Some(handle) = a.handles.iter().flatten().find(|h| b.has_handle(**h)) {
                    return Err(Error::DuplicateHandle {
                        handle: *handle,
                        first: a.name.clone(),
                        second: b.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Replace the handle list of the channel called `name`.
    ///
    /// Use this to adapt the table to a device revision whose firmware
    /// assigns different handles.
    pub fn with_handles(mut self, name: &str, handles: Vec<Option<u16>>) -> Result<Self> {
        let channel = self
            .channels
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownChannel(name.to_owned()))?;
        channel.handles = handles;
        self.validate()?;
        Ok(self)
    }

    /// Resolve a notification source to a channel name.
    ///
    /// For each channel (in declaration order) handle membership is tested
    /// before identifier equality.  Returns `None` when nothing matches.
    pub fn resolve(&self, source: &Source) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.matches(source))
            .map(|c| c.name.as_str())
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelDescriptor> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// All channels in declaration order.
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }
}

impl Default for Registry {
    /// Handle table observed on shipping Blueberry hardware.
    fn default() -> Self {
        Self {
            channels: vec![
                ChannelDescriptor::new(COMMAND, COMMAND_CHARACTERISTIC, vec![None]),
                ChannelDescriptor::new(
                    SHORT_PATH,
                    SHORT_PATH_CHARACTERISTIC,
                    vec![Some(19), Some(20), Some(27), Some(47)],
                ),
                ChannelDescriptor::new(
                    LONG_PATH,
                    LONG_PATH_CHARACTERISTIC,
                    vec![Some(23), Some(31), Some(22), Some(51)],
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KNOWN: [u16; 8] = [19, 20, 27, 47, 23, 31, 22, 51];

    #[test]
    fn default_table_is_valid() {
        let r = Registry::default();
        assert!(Registry::new(r.channels().to_vec()).is_ok());
    }

    #[test]
    fn resolves_handles() {
        let r = Registry::default();
        assert_eq!(r.resolve(&Source::Handle(20)), Some(SHORT_PATH));
        assert_eq!(r.resolve(&Source::Handle(47)), Some(SHORT_PATH));
        assert_eq!(r.resolve(&Source::Handle(22)), Some(LONG_PATH));
        assert_eq!(r.resolve(&Source::Handle(51)), Some(LONG_PATH));
    }

    #[test]
    fn resolves_identifiers_case_insensitively() {
        let r = Registry::default();
        assert_eq!(
            r.resolve(&"2F2E2D2C-2B2A-2928-2726-252423222120".into()),
            Some(SHORT_PATH)
        );
        assert_eq!(
            r.resolve(&Source::from(LONG_PATH_CHARACTERISTIC)),
            Some(LONG_PATH)
        );
        assert_eq!(
            r.resolve(&Source::from(COMMAND_CHARACTERISTIC)),
            Some(COMMAND)
        );
    }

    #[test]
    fn unknown_sources_do_not_resolve() {
        let r = Registry::default();
        assert_eq!(r.resolve(&Source::Handle(999)), None);
        assert_eq!(r.resolve(&Source::Handle(0)), None);
        assert_eq!(r.resolve(&"not-a-uuid".into()), None);
        assert_eq!(
            r.resolve(&"4f4e4d4c-4b4a-4948-4746-454443424140".into()),
            None
        );
    }

    #[test]
    fn first_declared_channel_wins() {
        // Same identifier on two channels: declaration order decides.
        let r = Registry::new(vec![
            ChannelDescriptor::new("a", SHORT_PATH_CHARACTERISTIC, vec![]),
            ChannelDescriptor::new("b", SHORT_PATH_CHARACTERISTIC, vec![Some(5)]),
        ])
        .unwrap();
        assert_eq!(r.resolve(&Source::from(SHORT_PATH_CHARACTERISTIC)), Some("a"));
        assert_eq!(r.resolve(&Source::Handle(5)), Some("b"));
    }

    #[test]
    fn duplicate_handles_are_rejected() {
        let err = Registry::new(vec![
            ChannelDescriptor::new(SHORT_PATH, SHORT_PATH_CHARACTERISTIC, vec![Some(19)]),
            ChannelDescriptor::new(LONG_PATH, LONG_PATH_CHARACTERISTIC, vec![None, Some(19)]),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandle { handle: 19, .. }));
    }

    #[test]
    fn placeholder_handles_never_collide() {
        assert!(Registry::new(vec![
            ChannelDescriptor::new("a", COMMAND_CHARACTERISTIC, vec![None]),
            ChannelDescriptor::new("b", SHORT_PATH_CHARACTERISTIC, vec![None]),
        ])
        .is_ok());
    }

    #[test]
    fn handles_can_be_reconfigured() {
        let r = Registry::default()
            .with_handles(LONG_PATH, vec![Some(60), Some(61)])
            .unwrap();
        assert_eq!(r.resolve(&Source::Handle(60)), Some(LONG_PATH));
        assert_eq!(r.resolve(&Source::Handle(23)), None);

        assert!(matches!(
            Registry::default().with_handles("nope", vec![]),
            Err(Error::UnknownChannel(_))
        ));
        assert!(matches!(
            Registry::default().with_handles(LONG_PATH, vec![Some(19)]),
            Err(Error::DuplicateHandle { .. })
        ));
    }

    proptest! {
        #[test]
        fn unregistered_handles_never_resolve(h in any::<u16>()) {
            prop_assume!(!KNOWN.contains(&h));
            let r = Registry::default();
            prop_assert_eq!(r.resolve(&Source::Handle(h)), None);
        }

        #[test]
        fn unregistered_uuids_never_resolve(raw in any::<u128>()) {
            let uuid = Uuid::from_u128(raw);
            let r = Registry::default();
            prop_assume!(r.channels().iter().all(|c| c.stable_id != uuid));
            prop_assert_eq!(r.resolve(&Source::from(uuid)), None);
        }
    }
}
