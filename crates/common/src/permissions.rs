//! Permission bits and entity flag bitsets.
//!
//! Bitsets are stored as plain integers in the database. Each set of bits is a
//! module of constants plus a thin `Copy` wrapper with `has`/`set`/`unset`.

use serde::{Deserialize, Serialize};

macro_rules! bitset {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            /// Whether every bit of `bits` is set.
            #[must_use]
            pub const fn has(self, bits: $repr) -> bool {
                self.0 & bits == bits
            }

            /// Whether any bit of `bits` is set.
            #[must_use]
            pub const fn any(self, bits: $repr) -> bool {
                self.0 & bits != 0
            }

            /// Return a copy with `bits` set.
            #[must_use]
            pub const fn set(self, bits: $repr) -> Self {
                Self(self.0 | bits)
            }

            /// Return a copy with `bits` cleared.
            #[must_use]
            pub const fn unset(self, bits: $repr) -> Self {
                Self(self.0 & !bits)
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }
    };
}

/// Role permission bits.
pub mod permission {
    pub const CREATE_EMOTE: i64 = 1 << 0;
    pub const EDIT_EMOTE: i64 = 1 << 1;
    pub const CREATE_EMOTE_SET: i64 = 1 << 2;
    pub const EDIT_EMOTE_SET: i64 = 1 << 3;

    pub const CREATE_REPORT: i64 = 1 << 13;
    pub const SEND_MESSAGES: i64 = 1 << 14;

    pub const FEATURE_ZERO_WIDTH_EMOTE_TYPE: i64 = 1 << 23;
    pub const FEATURE_PROFILE_PICTURE_ANIMATION: i64 = 1 << 24;
    pub const FEATURE_MESSAGING_PRIORITY: i64 = 1 << 25;

    pub const MANAGE_BANS: i64 = 1 << 30;
    pub const MANAGE_ROLES: i64 = 1 << 31;
    pub const MANAGE_REPORTS: i64 = 1 << 32;
    pub const MANAGE_USERS: i64 = 1 << 33;

    pub const EDIT_ANY_EMOTE: i64 = 1 << 41;
    pub const EDIT_ANY_EMOTE_SET: i64 = 1 << 42;

    pub const BYPASS_PRIVACY: i64 = 1 << 48;

    pub const MANAGE_CONTENT: i64 = 1 << 54;
    pub const MANAGE_STACK: i64 = 1 << 55;
    pub const MANAGE_COSMETICS: i64 = 1 << 56;
    pub const MANAGE_NEWS: i64 = 1 << 57;

    pub const SUPER_ADMINISTRATOR: i64 = 1 << 62;

    /// Permissions granted to the default role.
    pub const DEFAULT: i64 =
        CREATE_EMOTE | EDIT_EMOTE | CREATE_EMOTE_SET | EDIT_EMOTE_SET | CREATE_REPORT | SEND_MESSAGES;
}

bitset!(
    /// Effective permission set of an actor.
    Permissions(i64)
);

impl Permissions {
    /// Whether the set grants `bits`. Super administrators hold every permission.
    #[must_use]
    pub const fn allows(self, bits: i64) -> bool {
        self.has(permission::SUPER_ADMINISTRATOR) || self.has(bits)
    }
}

/// Permissions an editor holds over another user's resources.
pub mod editor_permission {
    pub const MODIFY_EMOTES: i32 = 1 << 0;
    pub const USE_PRIVATE_EMOTES: i32 = 1 << 1;
    pub const MANAGE_PROFILE: i32 = 1 << 2;
    pub const MANAGE_OWNED_EMOTES: i32 = 1 << 3;
    pub const MANAGE_EMOTE_SETS: i32 = 1 << 4;
    pub const MANAGE_BILLING: i32 = 1 << 5;
    pub const MANAGE_EDITORS: i32 = 1 << 6;
    pub const VIEW_MESSAGES: i32 = 1 << 7;

    /// Name used in `MISSING_EDITOR_PERMISSION` error fields.
    #[must_use]
    pub const fn name(bit: i32) -> &'static str {
        match bit {
            MODIFY_EMOTES => "MODIFY_EMOTES",
            USE_PRIVATE_EMOTES => "USE_PRIVATE_EMOTES",
            MANAGE_PROFILE => "MANAGE_PROFILE",
            MANAGE_OWNED_EMOTES => "MANAGE_OWNED_EMOTES",
            MANAGE_EMOTE_SETS => "MANAGE_EMOTE_SETS",
            MANAGE_BILLING => "MANAGE_BILLING",
            MANAGE_EDITORS => "MANAGE_EDITORS",
            VIEW_MESSAGES => "VIEW_MESSAGES",
            _ => "UNKNOWN",
        }
    }
}

bitset!(
    /// Editor permission bitset.
    EditorPermissions(i32)
);

/// Emote flag bits.
pub mod emote_flag {
    pub const PRIVATE: i32 = 1 << 0;
    pub const AUTHENTIC: i32 = 1 << 1;
    pub const ZERO_WIDTH: i32 = 1 << 8;
    pub const CONTENT_SEXUAL: i32 = 1 << 16;
    pub const CONTENT_EPILEPSY: i32 = 1 << 17;
    pub const CONTENT_EDGY: i32 = 1 << 18;
    pub const CONTENT_TWITCH_DISALLOWED: i32 = 1 << 24;

    /// Flags only actors with `EDIT_ANY_EMOTE` may change.
    pub const PRIVILEGED: i32 =
        CONTENT_SEXUAL | CONTENT_EPILEPSY | CONTENT_EDGY | CONTENT_TWITCH_DISALLOWED;

    /// Flags allowed at upload time.
    pub const UPLOADABLE: i32 = PRIVATE | ZERO_WIDTH;

    #[must_use]
    pub const fn name(bit: i32) -> &'static str {
        match bit {
            PRIVATE => "PRIVATE",
            AUTHENTIC => "AUTHENTIC",
            ZERO_WIDTH => "ZERO_WIDTH",
            CONTENT_SEXUAL => "SEXUAL",
            CONTENT_EPILEPSY => "EPILEPSY",
            CONTENT_EDGY => "EDGY",
            CONTENT_TWITCH_DISALLOWED => "TWITCH_DISALLOWED",
            _ => "UNKNOWN",
        }
    }
}

bitset!(
    /// Emote flags.
    EmoteFlags(i32)
);

/// Emote set flag bits.
pub mod emote_set_flag {
    pub const IMMUTABLE: i32 = 1 << 0;
    pub const PRIVILEGED: i32 = 1 << 1;
    pub const PERSONAL: i32 = 1 << 2;
    pub const COMMERCIAL: i32 = 1 << 3;
}

bitset!(
    /// Emote set flags.
    EmoteSetFlags(i32)
);

/// Active emote flag bits.
pub mod active_emote_flag {
    pub const ZERO_WIDTH: i32 = 1 << 0;
    pub const OVERRIDE_TWITCH_GLOBAL: i32 = 1 << 16;
    pub const OVERRIDE_TWITCH_SUBSCRIBER: i32 = 1 << 17;
    pub const OVERRIDE_BETTERTTV: i32 = 1 << 18;
}

bitset!(
    /// Active emote flags.
    ActiveEmoteFlags(i32)
);

/// Ban effect bits.
pub mod ban_effect {
    pub const NO_PERMISSIONS: i32 = 1 << 0;
    pub const NO_AUTH: i32 = 1 << 1;
    pub const NO_OWNERSHIP: i32 = 1 << 2;
    pub const MEMORY_HOLE: i32 = 1 << 3;
    pub const BLOCKED_IP: i32 = 1 << 4;

    /// Named effects, used to compose ban notifications.
    pub const NAMED: [(i32, &str); 5] = [
        (NO_PERMISSIONS, "NO_PERMISSIONS"),
        (NO_AUTH, "NO_AUTH"),
        (NO_OWNERSHIP, "NO_OWNERSHIP"),
        (MEMORY_HOLE, "MEMORY_HOLE"),
        (BLOCKED_IP, "BLOCKED_IP"),
    ];
}

bitset!(
    /// Ban effects.
    BanEffects(i32)
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_administrator_allows_everything() {
        let perms = Permissions(permission::SUPER_ADMINISTRATOR);
        assert!(perms.allows(permission::MANAGE_BANS | permission::EDIT_ANY_EMOTE));
    }

    #[test]
    fn test_allows_requires_every_bit() {
        let perms = Permissions(permission::CREATE_EMOTE);
        assert!(perms.allows(permission::CREATE_EMOTE));
        assert!(!perms.allows(permission::CREATE_EMOTE | permission::EDIT_EMOTE));
    }

    #[test]
    fn test_set_and_unset() {
        let flags = EmoteFlags::default()
            .set(emote_flag::PRIVATE | emote_flag::ZERO_WIDTH)
            .unset(emote_flag::PRIVATE);

        assert!(flags.has(emote_flag::ZERO_WIDTH));
        assert!(!flags.has(emote_flag::PRIVATE));
        assert!(!flags.any(emote_flag::PRIVILEGED));
    }

    #[test]
    fn test_editor_permission_names() {
        assert_eq!(
            editor_permission::name(editor_permission::MANAGE_PROFILE),
            "MANAGE_PROFILE"
        );
    }
}
