use bitflags::bitflags;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1). Bits above
    /// `EXTENDED_PROPERTIES` mirror the native stack's extended property set.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    pub struct Prop: u16 {
        /// Permits broadcasts of the Characteristic Value using Server
        /// Characteristic Configuration Descriptor.
        const BROADCAST = 0x001;
        /// Permits reads of the Characteristic Value.
        const READ = 0x002;
        /// Permit writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x004;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x008;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment.
        const NOTIFY = 0x010;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x020;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x040;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x080;
        /// Permits reliable writes of the Characteristic Value.
        const RELIABLE_WRITES = 0x100;
        /// Permits writes to the Characteristic User Description descriptor.
        const WRITABLE_AUXILIARIES = 0x200;
    }
}

const PROP_LABELS: [(Prop, &str); 10] = [
    (Prop::BROADCAST, "broadcast"),
    (Prop::READ, "read"),
    (Prop::WRITE_WITHOUT_RESPONSE, "write-without-response"),
    (Prop::WRITE, "write"),
    (Prop::NOTIFY, "notify"),
    (Prop::INDICATE, "indicate"),
    (Prop::AUTHENTICATED_SIGNED_WRITES, "authenticated-signed-writes"),
    (Prop::EXTENDED_PROPERTIES, "extended-properties"),
    (Prop::RELIABLE_WRITES, "reliable-writes"),
    (Prop::WRITABLE_AUXILIARIES, "writable-auxiliaries"),
];

impl Prop {
    /// Label used when no properties are set.
    pub const NONE_LABEL: &'static str = "none";

    /// Returns the canonical lower-case name of each set property in ascending
    /// bit order, or `["none"]` if no known property is set.
    #[must_use]
    pub fn labels(self) -> Vec<&'static str> {
        let v: Vec<_> = (PROP_LABELS.iter())
            .filter(|&&(p, _)| self.contains(p))
            .map(|&(_, s)| s)
            .collect();
        if v.is_empty() {
            vec![Self::NONE_LABEL]
        } else {
            v
        }
    }

    /// Returns whether the characteristic can be subscribed to.
    #[inline]
    #[must_use]
    pub const fn is_subscribable(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }
}

/// Maps a raw property bitmask to property labels. Unknown bits are ignored.
#[inline]
#[must_use]
pub fn properties_to_labels(bits: u16) -> Vec<&'static str> {
    Prop::from_bits_truncate(bits).labels()
}

bitflags! {
    /// Attribute permissions enforced by the native stack.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    pub struct Perm: u8 {
        /// Read access.
        const READABLE = 1 << 0;
        /// Write access.
        const WRITEABLE = 1 << 1;
        /// Read access requires an encrypted link.
        const READ_ENCRYPTION_REQUIRED = 1 << 2;
        /// Write access requires an encrypted link.
        const WRITE_ENCRYPTION_REQUIRED = 1 << 3;
        /// Read/write access.
        const READ_WRITE = Self::READABLE.bits() | Self::WRITEABLE.bits();
    }
}

impl Perm {
    /// Returns the lower-case name of each set permission.
    #[must_use]
    pub fn labels(self) -> Vec<&'static str> {
        const LABELS: [(Perm, &str); 4] = [
            (Perm::READABLE, "readable"),
            (Perm::WRITEABLE, "writeable"),
            (Perm::READ_ENCRYPTION_REQUIRED, "read-encryption-required"),
            (Perm::WRITE_ENCRYPTION_REQUIRED, "write-encryption-required"),
        ];
        (LABELS.iter())
            .filter(|&&(p, _)| self.contains(p))
            .map(|&(_, s)| s)
            .collect()
    }
}
