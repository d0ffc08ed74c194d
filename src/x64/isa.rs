//! ISA extension sets.
//!
//! A compilation target carries an immutable set of feature flags that
//! gates which catalog entries may be constructed. Extensions form a
//! prerequisite partial order (AVX2 implies AVX implies SSE4.2 and so on);
//! enabling a feature always enables its prerequisites so the invariant
//! "a present feature's prerequisites are present" holds by construction.

use std::fmt;

/// A single ISA feature flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Extension {
    Cmov,
    Mmx,
    MmxPlus,
    Sse,
    Sse2,
    Sse3,
    Ssse3,
    Sse4_1,
    Sse4_2,
    Popcnt,
    Lzcnt,
    Movbe,
    Aes,
    Pclmulqdq,
    Avx,
    F16c,
    Fma3,
    Avx2,
    Bmi,
    Bmi2,
    Adx,
    Xop,
    Fma4,
    Sha,
    Avx512f,
    Avx512bw,
    Avx512dq,
    Avx512vl,
}

impl Extension {
    pub const fn name(self) -> &'static str {
        match self {
            Extension::Cmov => "CMOV",
            Extension::Mmx => "MMX",
            Extension::MmxPlus => "MMX+",
            Extension::Sse => "SSE",
            Extension::Sse2 => "SSE2",
            Extension::Sse3 => "SSE3",
            Extension::Ssse3 => "SSSE3",
            Extension::Sse4_1 => "SSE4.1",
            Extension::Sse4_2 => "SSE4.2",
            Extension::Popcnt => "POPCNT",
            Extension::Lzcnt => "LZCNT",
            Extension::Movbe => "MOVBE",
            Extension::Aes => "AES",
            Extension::Pclmulqdq => "PCLMULQDQ",
            Extension::Avx => "AVX",
            Extension::F16c => "F16C",
            Extension::Fma3 => "FMA3",
            Extension::Avx2 => "AVX2",
            Extension::Bmi => "BMI",
            Extension::Bmi2 => "BMI2",
            Extension::Adx => "ADX",
            Extension::Xop => "XOP",
            Extension::Fma4 => "FMA4",
            Extension::Sha => "SHA",
            Extension::Avx512f => "AVX512F",
            Extension::Avx512bw => "AVX512BW",
            Extension::Avx512dq => "AVX512DQ",
            Extension::Avx512vl => "AVX512VL",
        }
    }

    /// Direct prerequisites; transitively closed by `IsaTarget::enable`.
    pub const fn prerequisites(self) -> &'static [Extension] {
        use Extension::*;
        match self {
            Cmov | Mmx | Popcnt | Lzcnt | Movbe | Sha => &[],
            MmxPlus => &[Mmx],
            Sse => &[MmxPlus],
            Sse2 => &[Sse],
            Sse3 => &[Sse2],
            Ssse3 => &[Sse3],
            Sse4_1 => &[Ssse3],
            Sse4_2 => &[Sse4_1],
            Aes | Pclmulqdq | Avx => &[Sse4_2],
            F16c | Fma3 | Xop | Fma4 => &[Avx],
            Avx2 => &[Avx, F16c, Fma3],
            Bmi => &[],
            Bmi2 => &[Bmi],
            Adx => &[],
            Avx512f => &[Avx2],
            Avx512bw | Avx512dq | Avx512vl => &[Avx512f],
        }
    }

    const fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable set of enabled extensions for a compilation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsaTarget {
    bits: u64,
}

impl IsaTarget {
    /// Empty target: only the x86-64 baseline instructions.
    pub const fn none() -> Self {
        IsaTarget { bits: 0 }
    }

    /// The x86-64 ABI baseline (every AMD64 CPU): CMOV and SSE2.
    pub fn baseline() -> Self {
        IsaTarget::none().with(Extension::Cmov).with(Extension::Sse2)
    }

    /// A modern default with the AVX2 family enabled.
    pub fn avx2() -> Self {
        IsaTarget::baseline()
            .with(Extension::Avx2)
            .with(Extension::Bmi2)
            .with(Extension::Popcnt)
            .with(Extension::Lzcnt)
    }

    /// Enable an extension and, transitively, its prerequisites.
    pub fn with(mut self, ext: Extension) -> Self {
        self.enable(ext);
        self
    }

    fn enable(&mut self, ext: Extension) {
        if self.bits & ext.bit() != 0 {
            return;
        }
        self.bits |= ext.bit();
        for &pre in ext.prerequisites() {
            self.enable(pre);
        }
    }

    pub fn has(&self, ext: Extension) -> bool {
        self.bits & ext.bit() != 0
    }
}

impl Default for IsaTarget {
    fn default() -> Self {
        IsaTarget::baseline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisites_close_transitively() {
        let t = IsaTarget::none().with(Extension::Avx2);
        for ext in [
            Extension::Avx,
            Extension::Fma3,
            Extension::F16c,
            Extension::Sse4_2,
            Extension::Sse2,
            Extension::Mmx,
        ] {
            assert!(t.has(ext), "{ext} should be implied by AVX2");
        }
        assert!(!t.has(Extension::Bmi2));
    }

    #[test]
    fn baseline_has_sse2() {
        let t = IsaTarget::baseline();
        assert!(t.has(Extension::Sse2));
        assert!(t.has(Extension::Sse));
        assert!(!t.has(Extension::Avx));
    }
}
