use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoder;
use crate::error::Error;

/// The encoder families this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderFamily {
    X264,
    NvEncC,
}

impl fmt::Display for EncoderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(encoder::descriptor(*self).name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    X64,
}

impl Architecture {
    /// Directory and file-name fragment used by the bundled toolset.
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => f.write_str("32-Bit (x86)"),
            Architecture::X64 => f.write_str("64-Bit (x64)"),
        }
    }
}

/// Bit depth for x264, codec for NVEncC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderVariant {
    Bit8,
    Bit10,
    Avc,
    Hevc,
}

impl EncoderVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            EncoderVariant::Bit8 => "8bit",
            EncoderVariant::Bit10 => "10bit",
            EncoderVariant::Avc => "avc",
            EncoderVariant::Hevc => "hevc",
        }
    }
}

impl fmt::Display for EncoderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderVariant::Bit8 => f.write_str("8-Bit"),
            EncoderVariant::Bit10 => f.write_str("10-Bit"),
            EncoderVariant::Avc => f.write_str("AVC"),
            EncoderVariant::Hevc => f.write_str("HEVC"),
        }
    }
}

/// Rate-control modes across all families. Each family supports a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateControl {
    /// Constant rate factor (constant quality).
    Crf,
    /// Constant quantizer.
    Cqp,
    /// Single-pass average bitrate.
    Abr,
    /// Two-pass average bitrate.
    TwoPass,
    Vbr,
    Vbr2,
    Cbr,
}

impl RateControl {
    /// Whether the mode is driven by `bitrate` rather than `quantizer`.
    pub fn is_bitrate_based(self) -> bool {
        !matches!(self, RateControl::Crf | RateControl::Cqp)
    }
}

impl fmt::Display for RateControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RateControl::Crf => "CRF",
            RateControl::Cqp => "CQ",
            RateControl::Abr => "ABR",
            RateControl::TwoPass => "2-Pass",
            RateControl::Vbr => "VBR",
            RateControl::Vbr2 => "VBR2",
            RateControl::Cbr => "CBR",
        };
        f.write_str(name)
    }
}

/// Sentinel that suppresses the `--tune` flag.
pub const TUNE_NONE: &str = "none";
/// Sentinels that suppress the `--profile` flag.
pub const PROFILE_AUTO: &str = "auto";
pub const PROFILE_UNRESTRICTED: &str = "unrestricted";

/// A snapshot of the user's encoder settings.
///
/// A job clones this at creation time and never mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    pub encoder: EncoderFamily,
    pub arch: Architecture,
    pub variant: EncoderVariant,
    pub rate_control: RateControl,
    /// Quantizer or CRF value, used by quantizer-based modes.
    pub quantizer: f64,
    /// Target bitrate in kbit/s, used by bitrate-based modes.
    pub bitrate: u32,
    pub preset: String,
    pub tune: String,
    pub profile: String,
    /// Extra encoder arguments, tokenized like a shell command line.
    pub custom_encoder: String,
    /// Extra arguments for the filter front-end.
    pub custom_filter: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions::x264()
    }
}

impl EncodeOptions {
    /// x264, 64-bit, 8-bit depth, CRF 22, preset "medium".
    pub fn x264() -> Self {
        EncodeOptions {
            encoder: EncoderFamily::X264,
            arch: Architecture::X64,
            variant: EncoderVariant::Bit8,
            rate_control: RateControl::Crf,
            quantizer: 22.0,
            bitrate: 1200,
            preset: "medium".into(),
            tune: TUNE_NONE.into(),
            profile: PROFILE_AUTO.into(),
            custom_encoder: String::new(),
            custom_filter: String::new(),
        }
    }

    /// NVEncC, 64-bit, AVC, CQP 20.
    pub fn nvencc() -> Self {
        EncodeOptions {
            encoder: EncoderFamily::NvEncC,
            arch: Architecture::X64,
            variant: EncoderVariant::Avc,
            rate_control: RateControl::Cqp,
            quantizer: 20.0,
            bitrate: 5000,
            preset: String::new(),
            tune: TUNE_NONE.into(),
            profile: PROFILE_AUTO.into(),
            custom_encoder: String::new(),
            custom_filter: String::new(),
        }
    }

    /// Switches to a quantizer-based mode.
    pub fn quality(mut self, mode: RateControl, quantizer: f64) -> Self {
        self.rate_control = mode;
        self.quantizer = quantizer;
        self
    }

    /// Switches to a bitrate-based mode.
    pub fn bitrate(mut self, mode: RateControl, kbps: u32) -> Self {
        self.rate_control = mode;
        self.bitrate = kbps;
        self
    }

    pub fn arch(mut self, arch: Architecture) -> Self {
        self.arch = arch;
        self
    }

    pub fn variant(mut self, variant: EncoderVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn tune(mut self, tune: impl Into<String>) -> Self {
        self.tune = tune.into();
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn custom_encoder(mut self, args: impl Into<String>) -> Self {
        self.custom_encoder = args.into();
        self
    }

    pub fn custom_filter(mut self, args: impl Into<String>) -> Self {
        self.custom_filter = args.into();
        self
    }

    /// Checks the options against the family's descriptor.
    pub fn validate(&self) -> Result<(), Error> {
        let desc = encoder::descriptor(self.encoder);

        if !desc.architectures.contains(&self.arch) {
            return Err(Error::UnsupportedArchitecture {
                family: self.encoder,
                arch: self.arch,
            });
        }
        if !desc.variants.contains(&self.variant) {
            return Err(Error::UnsupportedVariant {
                family: self.encoder,
                variant: self.variant,
            });
        }
        if !desc.rate_controls.contains(&self.rate_control) {
            return Err(Error::UnsupportedRateControl {
                family: self.encoder,
                mode: self.rate_control,
            });
        }

        if self.rate_control.is_bitrate_based() {
            if self.bitrate == 0 {
                return Err(Error::InvalidRateControlValue {
                    mode: self.rate_control,
                    reason: "bitrate must be greater than zero".into(),
                });
            }
        } else if !self.quantizer.is_finite()
            || self.quantizer < 0.0
            || self.quantizer > desc.max_quantizer
        {
            return Err(Error::InvalidRateControlValue {
                mode: self.rate_control,
                reason: format!(
                    "quantizer {} is outside 0..={}",
                    self.quantizer, desc.max_quantizer
                ),
            });
        }

        if !is_profile_sentinel(&self.profile) {
            let wanted = self.profile.trim().to_lowercase();
            if !desc.profiles(self.variant).contains(&wanted.as_str()) {
                return Err(Error::UnsupportedProfile {
                    family: self.encoder,
                    variant: self.variant,
                    profile: self.profile.clone(),
                });
            }
        }

        Ok(())
    }
}

pub(crate) fn is_profile_sentinel(profile: &str) -> bool {
    let profile = profile.trim();
    profile.is_empty()
        || profile.eq_ignore_ascii_case(PROFILE_AUTO)
        || profile.eq_ignore_ascii_case(PROFILE_UNRESTRICTED)
}

pub(crate) fn is_tune_sentinel(tune: &str) -> bool {
    let tune = tune.trim();
    tune.is_empty() || tune.eq_ignore_ascii_case(TUNE_NONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(EncodeOptions::x264().validate().is_ok());
        assert!(EncodeOptions::nvencc().validate().is_ok());
    }

    #[test]
    fn test_bitrate_mode_requires_bitrate() {
        let options = EncodeOptions::x264().bitrate(RateControl::TwoPass, 0);
        assert!(matches!(
            options.validate(),
            Err(Error::InvalidRateControlValue { .. })
        ));
    }

    #[test]
    fn test_mode_must_belong_to_family() {
        let options = EncodeOptions::x264().bitrate(RateControl::Cbr, 3000);
        assert!(matches!(
            options.validate(),
            Err(Error::UnsupportedRateControl { .. })
        ));

        let options = EncodeOptions::nvencc().bitrate(RateControl::TwoPass, 3000);
        assert!(matches!(
            options.validate(),
            Err(Error::UnsupportedRateControl { .. })
        ));
    }

    #[test]
    fn test_profile_checked_per_variant() {
        let options = EncodeOptions::x264().profile("High");
        assert!(options.validate().is_ok());

        let options = EncodeOptions::x264()
            .variant(EncoderVariant::Bit10)
            .profile("baseline");
        assert!(matches!(
            options.validate(),
            Err(Error::UnsupportedProfile { .. })
        ));

        let options = EncodeOptions::nvencc().profile(PROFILE_UNRESTRICTED);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_rehydrate_from_json() {
        let json = r#"{ "encoder": "nvencc", "variant": "hevc", "rate_control": "vbr", "bitrate": 8000 }"#;
        let options: EncodeOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.encoder, EncoderFamily::NvEncC);
        assert_eq!(options.variant, EncoderVariant::Hevc);
        assert_eq!(options.rate_control, RateControl::Vbr);
        assert_eq!(options.bitrate, 8000);
    }
}
