#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    io::{self, ErrorKind, Read, Write},
    path::Path,
    time::Duration,
};

use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use egvlink::{
    avec::{Config, Session, StreamTransport},
    sans::{
        command::Command,
        frame::{self, Decoded, Frame},
    },
};

pub const FIXTURE: &str = "fixtures/egv-readings.csv";

pub const FIRMWARE: &str = "<FirmwareHeader SchemaVersion='1' ApiVersion='2.2.0.0' \
    ProductId='G4Receiver' ProductName='Dexcom G4 Receiver' FirmwareVersion='2.0.1.104' />";

/// One expected reading from the fixture.
#[derive(Debug, Clone)]
pub struct Row {
    pub page: u32,
    pub system_seconds: i32,
    pub display_seconds: i32,
    pub glucose_raw: u16,
    pub trend_raw: u8,
    pub glucose: u16,
    pub trend: u8,
    pub trend_name: String,
    pub system_time: NaiveDateTime,
    pub display_time: NaiveDateTime,
}

pub fn fixture(path: impl AsRef<Path>) -> Vec<Row> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();

    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            Row {
                page: r[0].parse().unwrap(),
                system_seconds: r[1].parse().unwrap(),
                display_seconds: r[2].parse().unwrap(),
                glucose_raw: r[3].parse().unwrap(),
                trend_raw: r[4].parse().unwrap(),
                glucose: r[5].parse().unwrap(),
                trend: r[6].parse().unwrap(),
                trend_name: r[7].to_string(),
                system_time: r[8].parse().unwrap(),
                display_time: r[9].parse().unwrap(),
            }
        })
        .collect()
}

/// Build the payload of an EGV page.
pub fn page_payload(page_number: u32, rows: &[&Row]) -> Vec<u8> {
    let mut r = Vec::new();
    r.extend_from_slice(&(page_number as i32 * 100).to_le_bytes());
    r.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    r.push(4);
    r.push(1);
    r.extend_from_slice(&(page_number as i32).to_le_bytes());
    r.extend_from_slice(&[0; 14]);

    for row in rows {
        r.extend_from_slice(&row.system_seconds.to_le_bytes());
        r.extend_from_slice(&row.display_seconds.to_le_bytes());
        r.extend_from_slice(&row.glucose_raw.to_le_bytes());
        r.push(row.trend_raw);
        r.extend_from_slice(&[0x5A, 0xA5]);
    }

    r
}

/// An in-memory receiver answering frames the way the device does.
#[derive(Default)]
pub struct Receiver {
    firmware: String,
    range: Option<(i32, i32)>,
    pages: BTreeMap<u32, Vec<u8>>,
    overrides: HashMap<u8, u8>,
    rejected_pages: Vec<u32>,
    corrupt: usize,
    noise: Vec<u8>,
    false_sync: bool,
    chunk: Option<usize>,
    silent: bool,
    incoming: Vec<u8>,
    outgoing: Vec<u8>,
    /// Every frame received, in order.
    pub requests: Vec<Frame>,
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            firmware: FIRMWARE.to_string(),
            ..Default::default()
        }
    }

    /// A receiver holding the fixture's readings, one page per page number.
    pub fn with_rows(rows: &[Row]) -> Self {
        let mut receiver = Self::new();

        let mut by_page: BTreeMap<u32, Vec<&Row>> = BTreeMap::new();
        for row in rows {
            by_page.entry(row.page).or_default().push(row);
        }

        for (page, rows) in &by_page {
            receiver.pages.insert(*page, page_payload(*page, rows));
        }

        let low = by_page.keys().next().copied();
        let high = by_page.keys().next_back().copied();
        receiver.range = low.zip(high).map(|(l, h)| (l as i32, h as i32));

        receiver
    }

    /// Answer a command with a bare response code instead.
    pub fn respond_with(mut self, command: Command, response: Command) -> Self {
        self.overrides.insert(command.code(), response.code());
        self
    }

    /// Answer requests for a page with NAK.
    pub fn reject_page(mut self, index: u32) -> Self {
        self.rejected_pages.push(index);
        self
    }

    /// Corrupt the check value of the next `n` responses.
    pub fn corrupt(mut self, n: usize) -> Self {
        self.corrupt = n;
        self
    }

    /// Precede every response with bytes that cannot start a frame.
    pub fn noise(mut self, noise: &[u8]) -> Self {
        assert!(!noise.contains(&frame::SYNC));
        self.noise = noise.to_vec();
        self
    }

    /// Precede every response with a sync byte declaring an impossible length.
    pub fn false_sync(mut self) -> Self {
        self.false_sync = true;
        self
    }

    /// Deliver at most `n` bytes per read.
    pub fn chunked(mut self, n: usize) -> Self {
        self.chunk = Some(n);
        self
    }

    /// Never answer.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Commands received, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.requests.iter().map(|f| f.command).collect()
    }

    /// Page indices requested, in order.
    pub fn page_requests(&self) -> Vec<u32> {
        self.requests
            .iter()
            .filter(|f| f.command == Command::ReadDataPages.code())
            .map(|f| u32::from_le_bytes(f.payload[1..5].try_into().unwrap()))
            .collect()
    }

    fn answer(&mut self, request: Frame) {
        self.requests.push(request.clone());

        if self.silent {
            return;
        }

        let ack = Command::Ack.code();

        let (code, payload) = if let Some(&code) = self.overrides.get(&request.command) {
            (code, vec![])
        } else {
            match Command::from_code(request.command) {
                Some(Command::ReadFirmwareHeader) => (ack, self.firmware.as_bytes().to_vec()),
                Some(Command::ReadDataPageRange) => {
                    let (low, high) = match (request.payload.as_slice(), self.range) {
                        ([4], Some(range)) => range,
                        _ => (-1, -1),
                    };
                    let mut payload = low.to_le_bytes().to_vec();
                    payload.extend_from_slice(&high.to_le_bytes());
                    (ack, payload)
                }
                Some(Command::ReadDataPages) => {
                    assert_eq!(request.payload.len(), 6);
                    assert_eq!(request.payload[5], 1, "one page per request");

                    let index = u32::from_le_bytes(request.payload[1..5].try_into().unwrap());
                    if self.rejected_pages.contains(&index) {
                        (Command::Nak.code(), vec![])
                    } else if let Some(page) = self.pages.get(&index) {
                        (ack, page.clone())
                    } else {
                        (Command::InvalidParam.code(), vec![])
                    }
                }
                _ => (Command::InvalidCommand.code(), vec![]),
            }
        };

        let mut response = frame::encode(code, &payload);
        if self.corrupt > 0 {
            self.corrupt -= 1;
            *response.last_mut().unwrap() ^= 0xFF;
        }

        self.outgoing.extend_from_slice(&self.noise);
        if self.false_sync {
            self.outgoing.extend_from_slice(&[frame::SYNC, 0x02, 0x00]);
        }
        self.outgoing.extend_from_slice(&response);
    }
}

impl Read for Receiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outgoing.is_empty() {
            return Err(ErrorKind::WouldBlock.into());
        }

        let n = buf
            .len()
            .min(self.outgoing.len())
            .min(self.chunk.unwrap_or(usize::MAX));
        buf[..n].copy_from_slice(&self.outgoing[..n]);
        self.outgoing.drain(..n);

        Ok(n)
    }
}

impl Write for Receiver {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.incoming.extend_from_slice(buf);

        loop {
            match frame::decode(&self.incoming) {
                Decoded::Incomplete => break,
                Decoded::Invalid { consumed, error } => {
                    panic!("host sent an invalid frame ({error}), {consumed} bytes")
                }
                Decoded::Valid { frame, consumed } => {
                    self.incoming.drain(..consumed);
                    self.answer(frame);
                }
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn session(receiver: Receiver) -> Session<StreamTransport<Receiver>> {
    let config = Config::default()
        .with_poll_interval(Duration::from_millis(1))
        .with_response_timeout(Some(Duration::from_millis(200)));

    Session::with_config(StreamTransport::new(receiver), config)
}
