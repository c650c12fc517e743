//! Decoding data pages and estimated glucose value records.
//!
//! A page payload opens with a fixed header, followed immediately by
//! `record_count` records laid out back to back:
//!
//! ```text
//! header (28 bytes)
//! +-------+---------+------+----------+--------+-----------------+----------+
//! | index | records | type | revision | number | reserved (3×i32)| res (2B) |
//! |  i32  |   u32   |  u8  |    u8    |  i32   |                 |          |
//! +-------+---------+------+----------+--------+-----------------+----------+
//!
//! EGV record (13 bytes)
//! +----------------+-----------------+---------+-------+-----+
//! | system seconds | display seconds | glucose | trend | crc |
//! |      i32       |       i32       |   u16   |  u8   | u16 |
//! +----------------+-----------------+---------+-------+-----+
//! ```
//!
//! All fields are little-endian. Timestamps count seconds from the device
//! epoch, midnight on 2009-01-01 in the receiver's local time.

use alloc::{string::String, vec::Vec};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::{
    FromBytes,
    byteorder::little_endian::{I16, I32, U32},
};

use super::command::RecordType;

/// Length of a page header.
pub const PAGE_HEADER_LEN: usize = 28;

/// Length of an EGV record.
pub const EGV_RECORD_LEN: usize = 13;

/// An error decoding a response payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload ended before a complete structure was read.
    #[error("Payload truncated: needed {needed} bytes, {available} available.")]
    Truncated { needed: usize, available: usize },
    /// The page holds records of a type this decoder does not understand.
    #[error("Unsupported record type ({0}).")]
    UnsupportedRecordType(u8),
    /// The firmware header text is malformed.
    #[error("Malformed firmware header: {0}.")]
    Metadata(String),
}

/// The device epoch, midnight on 2009-01-01 in the receiver's local time.
pub fn device_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2009, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("the device epoch is a valid date")
}

/// Convert seconds since the device epoch to a local timestamp.
pub fn device_time(seconds: i32) -> NaiveDateTime {
    device_epoch() + TimeDelta::seconds(i64::from(seconds))
}

/// A coarse rate-of-change indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Trend {
    None = 0,
    DoubleUp = 1,
    SingleUp = 2,
    FortyFiveUp = 3,
    Flat = 4,
    FortyFiveDown = 5,
    SingleDown = 6,
    DoubleDown = 7,
    NotComputable = 8,
    RateOutOfRange = 9,
}

/// Name reported for trend codes missing from the trend table.
pub const UNKNOWN_TREND: &str = "UNKNOWN_TREND";

impl Trend {
    const ALL: [Trend; 10] = [
        Trend::None,
        Trend::DoubleUp,
        Trend::SingleUp,
        Trend::FortyFiveUp,
        Trend::Flat,
        Trend::FortyFiveDown,
        Trend::SingleDown,
        Trend::DoubleDown,
        Trend::NotComputable,
        Trend::RateOutOfRange,
    ];

    /// Look up a trend by its masked code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The display name of the trend, such as `FortyFiveUp`.
    pub fn name(self) -> &'static str {
        match self {
            Trend::None => "None",
            Trend::DoubleUp => "DoubleUp",
            Trend::SingleUp => "SingleUp",
            Trend::FortyFiveUp => "FortyFiveUp",
            Trend::Flat => "Flat",
            Trend::FortyFiveDown => "FortyFiveDown",
            Trend::SingleDown => "SingleDown",
            Trend::DoubleDown => "DoubleDown",
            Trend::NotComputable => "NotComputable",
            Trend::RateOutOfRange => "RateOutOfRange",
        }
    }
}

/// Name of a trend code, or [`UNKNOWN_TREND`].
pub fn trend_name(code: u8) -> &'static str {
    Trend::from_code(code).map_or(UNKNOWN_TREND, Trend::name)
}

bitfield! {
    /// The packed glucose word. High bits carry flags unrelated to the value.
    struct GlucoseWord(u16) {
        [0..10] value: u16,
        [15] display_only,
    }
}

bitfield! {
    /// The packed trend byte.
    struct TrendByte(u8) {
        [0..4] code: u8,
    }
}

/// The fixed prefix of a data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Index of the first record on this page within the whole log.
    pub index: i32,
    pub record_count: u32,
    pub record_type: u8,
    pub revision: u8,
    pub page_number: i32,
    pub reserved: [i32; 3],
    pub reserved_bytes: [u8; 2],
}

impl PageHeader {
    fn decode(r: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        #[derive(FromBytes)]
        #[repr(C)]
        struct RawHeader {
            index: I32,
            record_count: U32,
            record_type: u8,
            revision: u8,
            page_number: I32,
            reserved: [I32; 3],
            reserved_bytes: [u8; 2],
        }

        let bytes: [u8; PAGE_HEADER_LEN] = take(r, i)?;
        let RawHeader {
            index,
            record_count,
            record_type,
            revision,
            page_number,
            reserved,
            reserved_bytes,
        } = zerocopy::transmute!(bytes);

        Ok(PageHeader {
            index: index.get(),
            record_count: record_count.get(),
            record_type,
            revision,
            page_number: page_number.get(),
            reserved: reserved.map(|r| r.get()),
            reserved_bytes,
        })
    }
}

/// An estimated glucose value record, as stored on the receiver.
///
/// Fields hold the raw stored values; accessors apply the masks and
/// conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgvRecord {
    pub system_seconds: i32,
    pub display_seconds: i32,
    pub glucose_raw: i16,
    pub trend_raw: i8,
    pub checksum: i16,
}

impl EgvRecord {
    fn decode(r: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        #[derive(FromBytes)]
        #[repr(C)]
        struct RawRecord {
            system_seconds: I32,
            display_seconds: I32,
            glucose: I16,
            trend: i8,
            checksum: I16,
        }

        let bytes: [u8; EGV_RECORD_LEN] = take(r, i)?;
        let RawRecord {
            system_seconds,
            display_seconds,
            glucose,
            trend,
            checksum,
        } = zerocopy::transmute!(bytes);

        Ok(EgvRecord {
            system_seconds: system_seconds.get(),
            display_seconds: display_seconds.get(),
            glucose_raw: glucose.get(),
            trend_raw: trend,
            checksum: checksum.get(),
        })
    }

    /// The glucose value, with status flags masked off.
    pub fn glucose(&self) -> u16 {
        GlucoseWord(self.glucose_raw as u16).value()
    }

    /// Whether the receiver flagged this value as for display only.
    pub fn display_only(&self) -> bool {
        GlucoseWord(self.glucose_raw as u16).display_only()
    }

    /// The trend code, with the flag bits above it masked off.
    pub fn trend_code(&self) -> u8 {
        TrendByte(self.trend_raw as u8).code()
    }

    /// The trend, if the code is one the trend table knows.
    pub fn trend(&self) -> Option<Trend> {
        Trend::from_code(self.trend_code())
    }

    /// Name of the trend code, or [`UNKNOWN_TREND`].
    pub fn trend_name(&self) -> &'static str {
        trend_name(self.trend_code())
    }

    /// When the receiver stored the record, by its internal clock.
    pub fn system_time(&self) -> NaiveDateTime {
        device_time(self.system_seconds)
    }

    /// When the record was shown, by the user-adjusted display clock.
    pub fn display_time(&self) -> NaiveDateTime {
        device_time(self.display_seconds)
    }
}

/// A decoded data page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    /// Records in on-device storage order.
    pub records: Vec<EgvRecord>,
}

impl Page {
    /// Decode a page payload of EGV records.
    pub fn decode(r: &[u8]) -> Result<Self, DecodeError> {
        let i = &mut 0; // Offset of the next unread byte.

        let header = PageHeader::decode(r, i)?;

        if RecordType::from_code(header.record_type) != Some(RecordType::EgvData) {
            Err(DecodeError::UnsupportedRecordType(header.record_type))?;
        }

        // Check the whole record region up front, rather than failing partway.
        let needed = *i + header.record_count as usize * EGV_RECORD_LEN;
        if r.len() < needed {
            Err(DecodeError::Truncated {
                needed,
                available: r.len(),
            })?;
        }

        let records = (0..header.record_count)
            .map(|_| EgvRecord::decode(r, i))
            .collect::<Result<_, _>>()?;

        Ok(Page { header, records })
    }
}

/// A glucose reading, tagged with the page it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub page_number: i32,
    pub system_seconds: i32,
    pub display_seconds: i32,
    pub system_time: NaiveDateTime,
    pub display_time: NaiveDateTime,
    pub glucose: u16,
    pub trend: u8,
    pub trend_name: &'static str,
}

impl Reading {
    fn new(page_number: i32, record: &EgvRecord) -> Self {
        Reading {
            page_number,
            system_seconds: record.system_seconds,
            display_seconds: record.display_seconds,
            system_time: record.system_time(),
            display_time: record.display_time(),
            glucose: record.glucose(),
            trend: record.trend_code(),
            trend_name: record.trend_name(),
        }
    }
}

/// Flatten pages into readings, in page order and then record order.
pub fn flatten<'a>(pages: impl IntoIterator<Item = &'a Page>) -> Vec<Reading> {
    pages
        .into_iter()
        .flat_map(|page| {
            let page_number = page.header.page_number;
            page.records.iter().map(move |record| Reading::new(page_number, record))
        })
        .collect()
}

/// Take an exact number of bytes from an offset in a slice, advancing the offset.
pub(super) fn take<const N: usize>(r: &[u8], i: &mut usize) -> Result<[u8; N], DecodeError> {
    let s = *i;

    let bytes = r
        .get(s..s + N)
        .and_then(|b| <[u8; N]>::try_from(b).ok())
        .ok_or(DecodeError::Truncated {
            needed: s + N,
            available: r.len(),
        })?;

    *i += N;

    Ok(bytes)
}
