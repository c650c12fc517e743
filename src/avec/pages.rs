//! Walking the receiver's paged data log.

use std::{boxed::Box, vec::Vec};

use log::{debug, info};

use crate::sans::{
    command::{Command, PageRange, RecordType, read_data_page, read_data_page_range},
    exchange::ResponseError,
    record::{DecodeError, Page, Reading, flatten},
};

use super::{
    session::{Error, Session},
    transport::Transport,
};

impl<P: Transport> Session<P> {
    /// Read the range of stored pages for a record type.
    pub fn query_range(&mut self, record_type: RecordType) -> Result<PageRange, Error> {
        let range = self
            .send(read_data_page_range(record_type))?
            .ok_or(Error::MissingPayload(Command::ReadDataPageRange))?;

        debug!("{record_type} pages {}..={}", range.low, range.high);

        Ok(range)
    }

    /// Read every stored page of a record type, most recent first.
    ///
    /// `progress` receives the completed percentage before each page is
    /// requested, and 100 once all pages are read. The first failing page
    /// ends the download.
    ///
    /// Only EGV pages can be decoded; other record types fail before any
    /// request is sent.
    pub fn download_all(
        &mut self,
        record_type: RecordType,
        mut progress: impl FnMut(f64),
    ) -> Result<Vec<Page>, Error> {
        if record_type != RecordType::EgvData {
            Err(ResponseError::from(DecodeError::UnsupportedRecordType(record_type.code())))?;
        }

        let range = self.query_range(record_type)?;
        let total = range.len();

        let mut pages = Vec::with_capacity(total);

        for (i, index) in range.newest_first().enumerate() {
            progress(i as f64 * 100.0 / total as f64);

            let page = self
                .send(read_data_page(record_type, index))
                .and_then(|page| page.ok_or(Error::MissingPayload(Command::ReadDataPages)))
                .map_err(|source| Error::Page {
                    index,
                    source: Box::new(source),
                })?;

            pages.push(page);
        }

        progress(100.0);
        info!("read {} {record_type} pages", pages.len());

        Ok(pages)
    }

    /// Read every stored glucose reading, most recent page first.
    pub fn download_readings(&mut self, progress: impl FnMut(f64)) -> Result<Vec<Reading>, Error> {
        let pages = self.download_all(RecordType::EgvData, progress)?;

        Ok(flatten(&pages))
    }
}
