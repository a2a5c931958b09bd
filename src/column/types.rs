//! Physical value types stored inside column chunks (spec §3 "Column chunk").

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Bit,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    /// Dictionary index for variable-width string/blob columns.
    StringIndex,
    /// Internal row identifier (group-local offset or global id).
    InternalId,
}

impl PhysicalType {
    /// Bit width used by bitpacked compression's `T_bits` upper bound, and
    /// by the uncompressed on-disk slot size.
    pub fn bit_width(self) -> u32 {
        match self {
            PhysicalType::Bit => 1,
            PhysicalType::Int8 | PhysicalType::UInt8 => 8,
            PhysicalType::Int16 | PhysicalType::UInt16 => 16,
            PhysicalType::Int32 | PhysicalType::UInt32 | PhysicalType::Float | PhysicalType::StringIndex => 32,
            PhysicalType::Int64 | PhysicalType::UInt64 | PhysicalType::Double | PhysicalType::InternalId => 64,
            PhysicalType::Int128 => 128,
        }
    }

    pub fn byte_width(self) -> usize {
        ((self.bit_width() + 7) / 8) as usize
    }

    /// Whether min/max-driven bitpacking applies. Floats are only ever
    /// stored constant or uncompressed: their bit pattern order doesn't
    /// track numeric order, so a `base`-relative bit-width encoding would
    /// not be sound.
    pub fn supports_bitpack(self) -> bool {
        !matches!(self, PhysicalType::Float | PhysicalType::Double)
    }
}
