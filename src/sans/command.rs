//! Command codes, record types, and request descriptors.

use alloc::vec::Vec;
use core::{fmt, iter::Rev, ops::RangeInclusive};

use zerocopy::{FromBytes, byteorder::little_endian::I32};

use super::{
    frame,
    metadata::FirmwareHeader,
    record::{DecodeError, Page, take},
};

/// A command or response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Null = 0,
    Ack = 1,
    Nak = 2,
    InvalidCommand = 3,
    InvalidParam = 4,
    IncompletePacketReceived = 5,
    ReceiverError = 6,
    InvalidMode = 7,
    ReadFirmwareHeader = 11,
    ReadDataPageRange = 16,
    ReadDataPages = 17,
    ReadDataPageHeader = 18,
}

/// Name reported for codes missing from the command table.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";

impl Command {
    /// Look up a command by its code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Command::Null,
            1 => Command::Ack,
            2 => Command::Nak,
            3 => Command::InvalidCommand,
            4 => Command::InvalidParam,
            5 => Command::IncompletePacketReceived,
            6 => Command::ReceiverError,
            7 => Command::InvalidMode,
            11 => Command::ReadFirmwareHeader,
            16 => Command::ReadDataPageRange,
            17 => Command::ReadDataPages,
            18 => Command::ReadDataPageHeader,
            _ => None?,
        })
    }

    /// The code carried in a frame's command byte.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The protocol name of the command, such as `READ_DATA_PAGES`.
    pub fn name(self) -> &'static str {
        match self {
            Command::Null => "NULL",
            Command::Ack => "ACK",
            Command::Nak => "NAK",
            Command::InvalidCommand => "INVALID_COMMAND",
            Command::InvalidParam => "INVALID_PARAM",
            Command::IncompletePacketReceived => "INCOMPLETE_PACKET_RECEIVED",
            Command::ReceiverError => "RECEIVER_ERROR",
            Command::InvalidMode => "INVALID_MODE",
            Command::ReadFirmwareHeader => "READ_FIRMWARE_HEADER",
            Command::ReadDataPageRange => "READ_DATA_PAGE_RANGE",
            Command::ReadDataPages => "READ_DATA_PAGES",
            Command::ReadDataPageHeader => "READ_DATA_PAGE_HEADER",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of a command code, or [`UNKNOWN_COMMAND`].
pub fn command_name(code: u8) -> &'static str {
    Command::from_code(code).map_or(UNKNOWN_COMMAND, Command::name)
}

/// A category of data stored in the receiver's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    ManufacturingData = 0,
    FirmwareParameterData = 1,
    PcSoftwareParameter = 2,
    SensorData = 3,
    EgvData = 4,
    CalSet = 5,
    Deviation = 6,
    InsertionTime = 7,
    ReceiverLogData = 8,
    ReceiverErrorData = 9,
    MeterData = 10,
    UserEventData = 11,
    UserSettingData = 12,
}

impl RecordType {
    const ALL: [RecordType; 13] = [
        RecordType::ManufacturingData,
        RecordType::FirmwareParameterData,
        RecordType::PcSoftwareParameter,
        RecordType::SensorData,
        RecordType::EgvData,
        RecordType::CalSet,
        RecordType::Deviation,
        RecordType::InsertionTime,
        RecordType::ReceiverLogData,
        RecordType::ReceiverErrorData,
        RecordType::MeterData,
        RecordType::UserEventData,
        RecordType::UserSettingData,
    ];

    /// Look up a record type by its one-byte tag.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The tag sent in page range and page requests.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The protocol name of the record type, such as `EGV_DATA`.
    pub fn name(self) -> &'static str {
        match self {
            RecordType::ManufacturingData => "MANUFACTURING_DATA",
            RecordType::FirmwareParameterData => "FIRMWARE_PARAMETER_DATA",
            RecordType::PcSoftwareParameter => "PC_SOFTWARE_PARAMETER",
            RecordType::SensorData => "SENSOR_DATA",
            RecordType::EgvData => "EGV_DATA",
            RecordType::CalSet => "CAL_SET",
            RecordType::Deviation => "DEVIATION",
            RecordType::InsertionTime => "INSERTION_TIME",
            RecordType::ReceiverLogData => "RECEIVER_LOG_DATA",
            RecordType::ReceiverErrorData => "RECEIVER_ERROR_DATA",
            RecordType::MeterData => "METER_DATA",
            RecordType::UserEventData => "USER_EVENT_DATA",
            RecordType::UserSettingData => "USER_SETTING_DATA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive bounds of the valid page indices for a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub low: u32,
    pub high: u32,
}

impl PageRange {
    /// The range reported for a record type with no stored pages.
    pub const EMPTY: PageRange = PageRange { low: 1, high: 0 };

    /// Whether the record type has no stored pages.
    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    /// Number of pages in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.high - self.low) as usize + 1
        }
    }

    /// Page indices, most recent first.
    pub fn newest_first(&self) -> Rev<RangeInclusive<u32>> {
        (self.low..=self.high).rev()
    }

    fn decode(r: &[u8]) -> Result<Self, DecodeError> {
        #[derive(FromBytes)]
        #[repr(C)]
        struct RawRange {
            low: I32,
            high: I32,
        }

        let bytes: [u8; 8] = take(r, &mut 0)?;
        let RawRange { low, high } = zerocopy::transmute!(bytes);

        // The receiver reports an empty log with negative bounds.
        Ok(match (u32::try_from(low.get()), u32::try_from(high.get())) {
            (Ok(low), Ok(high)) => PageRange { low, high },
            _ => PageRange::EMPTY,
        })
    }
}

/// A request ready for transmission, paired with the decoder for its response.
///
/// A descriptor is the idle state of an exchange. See [`crate::sans::exchange`]
/// for the states following it.
pub struct Descriptor<T> {
    pub(super) command: Command,
    pub(super) frame: Vec<u8>,
    pub(super) decode: fn(&[u8]) -> Result<T, DecodeError>,
}

impl<T> Descriptor<T> {
    /// Build a descriptor for a command with a payload and response decoder.
    pub fn new(command: Command, payload: &[u8], decode: fn(&[u8]) -> Result<T, DecodeError>) -> Self {
        Self {
            command,
            frame: frame::encode(command.code(), payload),
            decode,
        }
    }

    /// The command this descriptor requests.
    pub fn command(&self) -> Command {
        self.command
    }

    /// The encoded frame to transmit.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("command", &self.command)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

/// Request the firmware header metadata.
pub fn read_firmware_header() -> Descriptor<FirmwareHeader> {
    Descriptor::new(Command::ReadFirmwareHeader, &[], FirmwareHeader::decode)
}

/// Request the range of stored pages for a record type.
pub fn read_data_page_range(record_type: RecordType) -> Descriptor<PageRange> {
    Descriptor::new(Command::ReadDataPageRange, &[record_type.code()], PageRange::decode)
}

/// Request a single page of a record type.
pub fn read_data_page(record_type: RecordType, index: u32) -> Descriptor<Page> {
    const PAGE_COUNT: u8 = 1;

    let mut payload = [0; 6];
    payload[0] = record_type.code();
    payload[1..5].copy_from_slice(&index.to_le_bytes());
    payload[5] = PAGE_COUNT;

    Descriptor::new(Command::ReadDataPages, &payload, Page::decode)
}

/// Request the header of the current data page. The response is returned
/// undecoded.
pub fn read_data_page_header() -> Descriptor<Vec<u8>> {
    Descriptor::new(Command::ReadDataPageHeader, &[], |r| Ok(r.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::super::frame::{Decoded, decode};
    use super::*;

    #[test]
    fn command_codes_are_fixed() {
        let table = [
            (Command::Null, 0),
            (Command::Ack, 1),
            (Command::Nak, 2),
            (Command::InvalidCommand, 3),
            (Command::InvalidParam, 4),
            (Command::IncompletePacketReceived, 5),
            (Command::ReceiverError, 6),
            (Command::InvalidMode, 7),
            (Command::ReadFirmwareHeader, 11),
            (Command::ReadDataPageRange, 16),
            (Command::ReadDataPages, 17),
            (Command::ReadDataPageHeader, 18),
        ];

        for (command, code) in table {
            assert_eq!(command.code(), code);
            assert_eq!(Command::from_code(code), Some(command));
        }
    }

    #[test]
    fn names_unknown_commands() {
        assert_eq!(command_name(2), "NAK");
        assert_eq!(command_name(16), "READ_DATA_PAGE_RANGE");
        assert_eq!(command_name(8), UNKNOWN_COMMAND);
        assert_eq!(command_name(0xFF), UNKNOWN_COMMAND);
    }

    #[test]
    fn record_type_table() {
        assert_eq!(RecordType::from_code(4), Some(RecordType::EgvData));
        assert_eq!(RecordType::from_code(12), Some(RecordType::UserSettingData));
        assert_eq!(RecordType::from_code(13), None);
        assert_eq!(RecordType::CalSet.name(), "CAL_SET");
    }

    #[test]
    fn page_range_request_layout() {
        let descriptor = read_data_page_range(RecordType::EgvData);

        let Decoded::Valid { frame, .. } = decode(descriptor.frame()) else {
            panic!("descriptor frame should be valid");
        };
        assert_eq!(frame.command, 16);
        assert_eq!(frame.payload, [4]);
    }

    #[test]
    fn page_request_layout() {
        let descriptor = read_data_page(RecordType::EgvData, 0x0102_0304);

        let Decoded::Valid { frame, .. } = decode(descriptor.frame()) else {
            panic!("descriptor frame should be valid");
        };
        assert_eq!(frame.command, 17);
        assert_eq!(frame.payload, [4, 0x04, 0x03, 0x02, 0x01, 1]);
    }

    #[test]
    fn decodes_page_range() {
        let mut r = [0; 8];
        r[..4].copy_from_slice(&10i32.to_le_bytes());
        r[4..].copy_from_slice(&12i32.to_le_bytes());

        let range = PageRange::decode(&r).unwrap();
        assert_eq!(range, PageRange { low: 10, high: 12 });
        assert_eq!(range.len(), 3);
        assert!(range.newest_first().eq([12, 11, 10]));
    }

    #[test]
    fn negative_page_range_is_empty() {
        let r = [0xFF; 8];

        let range = PageRange::decode(&r).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(range.newest_first().count(), 0);
    }

    #[test]
    fn truncated_page_range_fails() {
        assert!(matches!(
            PageRange::decode(&[1, 0, 0, 0]),
            Err(DecodeError::Truncated { needed: 8, available: 4 })
        ));
    }
}
