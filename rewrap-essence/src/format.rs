//! Supported raw essence types.
//!
//! Each clip-wrapped essence container label maps to one parsing strategy
//! and, where the format has one, a constant frame size.

use std::fmt;

/// A 16-byte essence container label.
pub type Label = [u8; 16];

const fn generic_container(regver: u8, mapping: u8, byte15: u8, byte16: u8) -> Label {
    [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, regver, 0x0d, 0x01, 0x03, 0x01, 0x02, mapping,
        byte15, byte16,
    ]
}

const fn avid_container(byte14: u8, byte15: u8, byte16: u8) -> Label {
    [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0e, 0x04, 0x03, 0x01, 0x02, byte14,
        byte15, byte16,
    ]
}

const fn avid_imx_container(byte15: u8) -> Label {
    [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0d, 0x01, 0x03, 0x01, 0x02, 0x01,
        byte15, 0x7f,
    ]
}

/// How a raw essence stream is split into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStrategy {
    /// Every frame has the same size.
    Fixed,
    /// PCM audio with a per-frame sample count sequence.
    Pcm,
    /// Frame boundaries are found by scanning for markers.
    Variable,
}

/// Clip-wrapped essence types that can be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssenceType {
    IecDv25_525_60,
    IecDv25_625_50,
    DvBased25_525_60,
    DvBased25_625_50,
    DvBased50_525_60,
    DvBased50_625_50,
    DvBased100_1080_50i,
    DvBased100_720_50p,
    DnxHd1235,
    DnxHd1237,
    DnxHd1238,
    DnxHd1241,
    DnxHd1242,
    DnxHd1243,
    DnxHd1250,
    DnxHd1251,
    DnxHd1252,
    DnxHd1253,
    SdUnc625_50i,
    HdUnc1080_50i,
    HdUnc720_50p,
    AvidImx30_625_50,
    AvidImx40_625_50,
    AvidImx50_625_50,
    AvidImx30_525_60,
    AvidImx40_525_60,
    AvidImx50_525_60,
    AvidMjpeg,
    Bwf,
    Aes3,
}

impl EssenceType {
    /// Every supported type, in lookup order.
    pub const ALL: [EssenceType; 30] = [
        EssenceType::IecDv25_525_60,
        EssenceType::IecDv25_625_50,
        EssenceType::DvBased25_525_60,
        EssenceType::DvBased25_625_50,
        EssenceType::DvBased50_525_60,
        EssenceType::DvBased50_625_50,
        EssenceType::DvBased100_1080_50i,
        EssenceType::DvBased100_720_50p,
        EssenceType::DnxHd1235,
        EssenceType::DnxHd1237,
        EssenceType::DnxHd1238,
        EssenceType::DnxHd1241,
        EssenceType::DnxHd1242,
        EssenceType::DnxHd1243,
        EssenceType::DnxHd1250,
        EssenceType::DnxHd1251,
        EssenceType::DnxHd1252,
        EssenceType::DnxHd1253,
        EssenceType::SdUnc625_50i,
        EssenceType::HdUnc1080_50i,
        EssenceType::HdUnc720_50p,
        EssenceType::AvidImx30_625_50,
        EssenceType::AvidImx40_625_50,
        EssenceType::AvidImx50_625_50,
        EssenceType::AvidImx30_525_60,
        EssenceType::AvidImx40_525_60,
        EssenceType::AvidImx50_525_60,
        EssenceType::AvidMjpeg,
        EssenceType::Bwf,
        EssenceType::Aes3,
    ];

    /// Look up the essence type for a container label.
    pub fn from_label(label: &Label) -> Option<EssenceType> {
        Self::ALL.iter().copied().find(|t| t.label() == *label)
    }

    /// The clip-wrapped essence container label.
    pub fn label(self) -> Label {
        use EssenceType::*;
        match self {
            IecDv25_525_60 => generic_container(0x01, 0x02, 0x01, 0x02),
            IecDv25_625_50 => generic_container(0x01, 0x02, 0x02, 0x02),
            DvBased25_525_60 => generic_container(0x01, 0x02, 0x40, 0x02),
            DvBased25_625_50 => generic_container(0x01, 0x02, 0x41, 0x02),
            DvBased50_525_60 => generic_container(0x01, 0x02, 0x50, 0x02),
            DvBased50_625_50 => generic_container(0x01, 0x02, 0x51, 0x02),
            DvBased100_1080_50i => generic_container(0x01, 0x02, 0x61, 0x02),
            DvBased100_720_50p => generic_container(0x01, 0x02, 0x63, 0x02),
            DnxHd1235 => avid_container(0x06, 0x01, 0x01),
            DnxHd1237 => avid_container(0x06, 0x01, 0x02),
            DnxHd1238 => avid_container(0x06, 0x01, 0x03),
            DnxHd1253 => avid_container(0x06, 0x01, 0x04),
            DnxHd1241 => avid_container(0x06, 0x02, 0x01),
            DnxHd1242 => avid_container(0x06, 0x02, 0x02),
            DnxHd1243 => avid_container(0x06, 0x02, 0x03),
            DnxHd1250 => avid_container(0x06, 0x03, 0x01),
            DnxHd1251 => avid_container(0x06, 0x03, 0x02),
            DnxHd1252 => avid_container(0x06, 0x03, 0x03),
            SdUnc625_50i => generic_container(0x01, 0x05, 0x01, 0x06),
            HdUnc1080_50i => generic_container(0x01, 0x05, 0x02, 0x2a),
            HdUnc720_50p => generic_container(0x01, 0x05, 0x03, 0x1a),
            AvidImx50_625_50 => avid_imx_container(0x01),
            AvidImx50_525_60 => avid_imx_container(0x02),
            AvidImx40_625_50 => avid_imx_container(0x03),
            AvidImx40_525_60 => avid_imx_container(0x04),
            AvidImx30_625_50 => avid_imx_container(0x05),
            AvidImx30_525_60 => avid_imx_container(0x06),
            AvidMjpeg => avid_container(0x01, 0x00, 0x00),
            Bwf => generic_container(0x01, 0x06, 0x02, 0x00),
            Aes3 => generic_container(0x01, 0x06, 0x04, 0x00),
        }
    }

    pub fn strategy(self) -> ParserStrategy {
        match self {
            EssenceType::AvidMjpeg => ParserStrategy::Variable,
            EssenceType::Bwf | EssenceType::Aes3 => ParserStrategy::Pcm,
            _ => ParserStrategy::Fixed,
        }
    }

    /// Constant frame size in bytes, or 0 when it must be derived.
    pub fn fixed_frame_size(self) -> u32 {
        use EssenceType::*;
        match self {
            IecDv25_525_60 | DvBased25_525_60 => 120_000,
            IecDv25_625_50 | DvBased25_625_50 => 144_000,
            DvBased50_525_60 => 240_000,
            DvBased50_625_50 | DvBased100_720_50p => 288_000,
            DvBased100_1080_50i => 576_000,
            DnxHd1235 | DnxHd1238 | DnxHd1241 | DnxHd1243 => 917_504,
            DnxHd1237 | DnxHd1242 => 606_208,
            DnxHd1250 | DnxHd1251 => 458_752,
            DnxHd1252 => 303_104,
            DnxHd1253 => 188_416,
            _ => 0,
        }
    }

    /// Uncompressed picture types whose frame size follows from the descriptor.
    pub fn is_uncompressed(self) -> bool {
        matches!(
            self,
            EssenceType::SdUnc625_50i | EssenceType::HdUnc1080_50i | EssenceType::HdUnc720_50p
        )
    }

    /// MPEG elementary streams whose frame size is found by scanning.
    pub fn is_mpeg(self) -> bool {
        use EssenceType::*;
        matches!(
            self,
            AvidImx30_625_50
                | AvidImx40_625_50
                | AvidImx50_625_50
                | AvidImx30_525_60
                | AvidImx40_525_60
                | AvidImx50_525_60
        )
    }
}

impl fmt::Display for EssenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Avid MJPEG compression resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MjpegResolution {
    /// 2:1
    Mjpeg2_1,
    /// 3:1
    Mjpeg3_1,
    /// 10:1
    Mjpeg10_1,
    /// 20:1
    Mjpeg20_1,
    /// 15:1s, single field
    Mjpeg15_1s,
    /// 4:1m, single field
    Mjpeg4_1m,
    /// 10:1m, single field
    Mjpeg10_1m,
}

impl MjpegResolution {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0x4b => Some(MjpegResolution::Mjpeg10_1),
            0x4c => Some(MjpegResolution::Mjpeg2_1),
            0x4d => Some(MjpegResolution::Mjpeg3_1),
            0x4e => Some(MjpegResolution::Mjpeg15_1s),
            0x52 => Some(MjpegResolution::Mjpeg20_1),
            0x6e => Some(MjpegResolution::Mjpeg10_1m),
            0x6f => Some(MjpegResolution::Mjpeg4_1m),
            _ => None,
        }
    }

    /// The Avid resolution id.
    pub fn id(self) -> u32 {
        match self {
            MjpegResolution::Mjpeg10_1 => 0x4b,
            MjpegResolution::Mjpeg2_1 => 0x4c,
            MjpegResolution::Mjpeg3_1 => 0x4d,
            MjpegResolution::Mjpeg15_1s => 0x4e,
            MjpegResolution::Mjpeg20_1 => 0x52,
            MjpegResolution::Mjpeg10_1m => 0x6e,
            MjpegResolution::Mjpeg4_1m => 0x6f,
        }
    }

    /// Nominal compression ratio.
    pub fn compression_ratio(self) -> u32 {
        match self {
            MjpegResolution::Mjpeg2_1 => 2,
            MjpegResolution::Mjpeg3_1 => 3,
            MjpegResolution::Mjpeg4_1m => 4,
            MjpegResolution::Mjpeg10_1 | MjpegResolution::Mjpeg10_1m => 10,
            MjpegResolution::Mjpeg15_1s => 15,
            MjpegResolution::Mjpeg20_1 => 20,
        }
    }

    /// Single-field resolutions store one JPEG image per frame.
    pub fn is_single_field(self) -> bool {
        matches!(
            self,
            MjpegResolution::Mjpeg15_1s | MjpegResolution::Mjpeg10_1m | MjpegResolution::Mjpeg4_1m
        )
    }
}
