//! ISO 11783 NAME field implementation (64 bits). This field uniquely
//! identifies equipment on the NMEA 2000 network and is used throughout
//! the address-claim procedure. The module provides a typed wrapper around
//! the raw `u64` plus safe accessors/builders.
//!
//! # Bit layout (Little Endian order)
//!
//! ```text
//! Bits  0-20  (21 bits) : Unique number
//! Bits 21-31  (11 bits) : Manufacturer code
//! Bits 32-34  ( 3 bits) : Device instance (lower part)
//! Bits 35-39  ( 5 bits) : Device instance (upper part)
//! Bits 40-47  ( 8 bits) : Device function
//! Bit  48     ( 1 bit ) : Reserved
//! Bits 49-55  ( 7 bits) : Device class
//! Bits 56-59  ( 4 bits) : System instance
//! Bits 60-62  ( 3 bits) : Industry group
//! Bit  63     ( 1 bit ) : Arbitrary Address Capable
//! ```

use std::fmt;

/// Wrapper around the ISO 11783 NAME field (64 bits).
///
/// Provides a lightweight API to manipulate the field used in PGN 60928
/// (address claim).
///
/// # Example
///
/// ```
/// use korri_router::protocol::managment::iso_name::IsoName;
///
/// let name = IsoName::builder()
///     .unique_number(123456)
///     .manufacturer_code(275)  // Exemple : Actisense
///     .device_function(130)    // Exemple : Diagnostic Tool
///     .device_class(25)        // Exemple : Inter/Intranetwork Device
///     .arbitrary_address_capable(true)
///     .build();
///
/// assert_eq!(name.unique_number(), 123456);
/// assert_eq!(name.manufacturer_code(), 275);
/// assert!(name.is_arbitrary_address_capable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoName(u64);

impl IsoName {
    /// Build an `IsoName` from the raw value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the underlying `u64`.
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Create a builder to construct an `IsoName`.
    #[inline]
    pub const fn builder() -> IsoNameBuilder {
        IsoNameBuilder::new()
    }

    // Individual accessors for NAME sub-fields.

    /// Unique number (bits 0-20, 21 bits).
    ///
    /// Identifies the product within the manufacturer lineup.
    #[inline]
    pub const fn unique_number(&self) -> u32 {
        (self.0 & 0x1F_FFFF) as u32
    }

    /// Manufacturer code (bits 21-31, 11 bits).
    #[inline]
    pub const fn manufacturer_code(&self) -> u16 {
        ((self.0 >> 21) & 0x7FF) as u16
    }

    /// Lower part of the device instance (bits 32-34, 3 bits).
    #[inline]
    pub const fn device_instance_lower(&self) -> u8 {
        ((self.0 >> 32) & 0x07) as u8
    }

    /// Upper part of the device instance (bits 35-39, 5 bits).
    #[inline]
    pub const fn device_instance_upper(&self) -> u8 {
        ((self.0 >> 35) & 0x1F) as u8
    }

    /// Full 8-bit instance (merge of upper and lower parts).
    #[inline]
    pub const fn device_instance(&self) -> u8 {
        (self.device_instance_lower() | (self.device_instance_upper() << 3)) & 0xFF
    }

    /// Device function (bits 40-47, 8 bits).
    #[inline]
    pub const fn device_function(&self) -> u8 {
        ((self.0 >> 40) & 0xFF) as u8
    }

    /// Reserved bit (bit 48).
    #[inline]
    pub const fn spare(&self) -> bool {
        ((self.0 >> 48) & 0x01) != 0
    }

    /// Device class (bits 49-55, 7 bits).
    #[inline]
    pub const fn device_class(&self) -> u8 {
        ((self.0 >> 49) & 0x7F) as u8
    }

    /// System instance (bits 56-59, 4 bits).
    #[inline]
    pub const fn system_instance(&self) -> u8 {
        ((self.0 >> 56) & 0x0F) as u8
    }

    /// Industry group (bits 60-62, 3 bits).
    ///
    /// Typical value: `4` for the marine industry.
    #[inline]
    pub const fn industry_group(&self) -> u8 {
        ((self.0 >> 60) & 0x07) as u8
    }

    /// Arbitrary Address Capable bit (bit 63).
    ///
    /// Indicates whether the node may claim arbitrary addresses (128-247).
    #[inline]
    pub const fn is_arbitrary_address_capable(&self) -> bool {
        ((self.0 >> 63) & 0x01) != 0
    }

    /// Returns `true` when the equipment is tagged as marine.
    #[inline]
    pub const fn is_marine(&self) -> bool {
        self.industry_group() == 4
    }
}

impl From<u64> for IsoName {
    #[inline]
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<IsoName> for u64 {
    #[inline]
    fn from(name: IsoName) -> Self {
        name.raw()
    }
}

impl fmt::Display for IsoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IsoName {{ unique: {}, mfg: {}, func: {}, class: {}, inst: {}, aac: {} }}",
            self.unique_number(),
            self.manufacturer_code(),
            self.device_function(),
            self.device_class(),
            self.device_instance(),
            self.is_arbitrary_address_capable()
        )
    }
}

/// Fluent builder used to construct an `IsoName`.
///
/// # Example
///
/// ```
/// use korri_router::protocol::managment::iso_name::IsoName;
///
/// let name = IsoName::builder()
///     .unique_number(12345)
///     .manufacturer_code(275)
///     .arbitrary_address_capable(true)
///     .build();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct IsoNameBuilder {
    raw: u64,
}

impl IsoNameBuilder {
    /// Initialize the builder with all fields cleared.
    #[inline]
    pub const fn new() -> Self {
        Self { raw: 0 }
    }

    /// Set the unique number (bits 0-20, 21 bits).
    ///
    /// # Panics
    /// Panics when the value does not fit in 21 bits (> 0x1FFFFF).
    #[inline]
    pub const fn unique_number(mut self, value: u32) -> Self {
        assert!(value <= 0x1F_FFFF, "Unique number must fit in 21 bits");
        self.raw = (self.raw & !0x1F_FFFF) | (value as u64 & 0x1F_FFFF);
        self
    }

    /// Set the manufacturer code (bits 21-31, 11 bits).
    ///
    /// # Panics
    /// Panics when the value exceeds 11 bits (> 0x7FF).
    #[inline]
    pub const fn manufacturer_code(mut self, value: u16) -> Self {
        assert!(value <= 0x7FF, "Manufacturer code must fit in 11 bits");
        self.raw = (self.raw & !(0x7FF << 21)) | ((value as u64 & 0x7FF) << 21);
        self
    }

    /// Set the lower portion of the device instance (bits 32-34, 3 bits).
    ///
    /// # Panics
    /// Panics when the value exceeds 3 bits (> 0x07).
    #[inline]
    pub const fn device_instance_lower(mut self, value: u8) -> Self {
        assert!(value <= 0x07, "Device instance lower must fit in 3 bits");
        self.raw = (self.raw & !(0x07 << 32)) | ((value as u64 & 0x07) << 32);
        self
    }

    /// Set the upper portion of the device instance (bits 35-39, 5 bits).
    ///
    /// # Panics
    /// Panics when the value exceeds 5 bits (> 0x1F).
    #[inline]
    pub const fn device_instance_upper(mut self, value: u8) -> Self {
        assert!(value <= 0x1F, "Device instance upper must fit in 5 bits");
        self.raw = (self.raw & !(0x1F << 35)) | ((value as u64 & 0x1F) << 35);
        self
    }

    /// Convenience helper to set the full 8-bit instance.
    #[inline]
    pub const fn device_instance(self, value: u8) -> Self {
        self.device_instance_lower(value & 0x07)
            .device_instance_upper((value >> 3) & 0x1F)
    }

    /// Set the device function (bits 40-47, 8 bits).
    #[inline]
    pub const fn device_function(mut self, value: u8) -> Self {
        self.raw = (self.raw & !(0xFF << 40)) | ((value as u64) << 40);
        self
    }

    /// Update the reserved bit (bit 48).
    #[inline]
    pub const fn spare(mut self, value: bool) -> Self {
        self.raw = (self.raw & !(0x01 << 48)) | ((value as u64) << 48);
        self
    }

    /// Set the device class (bits 49-55, 7 bits).
    ///
    /// # Panics
    /// Panics when the value exceeds 7 bits (> 0x7F).
    #[inline]
    pub const fn device_class(mut self, value: u8) -> Self {
        assert!(value <= 0x7F, "Device class must fit in 7 bits");
        self.raw = (self.raw & !(0x7F << 49)) | ((value as u64 & 0x7F) << 49);
        self
    }

    /// Set the system instance (bits 56-59, 4 bits).
    ///
    /// # Panics
    /// Panics when the value exceeds 4 bits (> 0x0F).
    #[inline]
    pub const fn system_instance(mut self, value: u8) -> Self {
        assert!(value <= 0x0F, "System instance must fit in 4 bits");
        self.raw = (self.raw & !(0x0F << 56)) | ((value as u64 & 0x0F) << 56);
        self
    }

    /// Set the industry group (bits 60-62, 3 bits).
    ///
    /// Typical value: `4` for marine uses.
    ///
    /// # Panics
    /// Panics when the value exceeds 3 bits (> 0x07).
    #[inline]
    pub const fn industry_group(mut self, value: u8) -> Self {
        assert!(value <= 0x07, "Industry group must fit in 3 bits");
        self.raw = (self.raw & !(0x07 << 60)) | ((value as u64 & 0x07) << 60);
        self
    }

    /// Configure the Arbitrary Address Capable bit (bit 63).
    #[inline]
    pub const fn arbitrary_address_capable(mut self, value: bool) -> Self {
        self.raw = (self.raw & !(0x01 << 63)) | ((value as u64) << 63);
        self
    }

    /// Build the final `IsoName`.
    #[inline]
    pub const fn build(self) -> IsoName {
        IsoName(self.raw)
    }
}

impl Default for IsoNameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
