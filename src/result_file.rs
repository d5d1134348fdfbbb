//! Saved test results.
//!
//! A result file is a CSV file with exactly three rows, one per map:
//!
//! ```text
//! distDict,"{""5 cm"":[5.1,4.9],""10 cm"":[10.2]}"
//! loopTimeDict,"{""5 cm"":[101.5,99.8],""10 cm"":[100.1]}"
//! testInfoDict,"(testType:distMeas,numSamples:100,...)"
//! ```
//!
//! The second cell of every row is the [ron] text of the structure, quoted the
//! way spreadsheets quote CSV cells. There is no version field; a file only
//! reads back with the same structure definitions it was written with.

use crate::config::TestInfo;
use crate::distance_map::DistanceMap;

use chrono::{DateTime, Local};
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

const DIST_KEY: &str = "distDict";
const LOOP_TIME_KEY: &str = "loopTimeDict";
const TEST_INFO_KEY: &str = "testInfoDict";

/// Samples, loop timings and settings of one device's test run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFile {
    /// Measured ranges per distance, in centimeters
    pub dist: DistanceMap,
    /// Measurement loop durations per distance, in milliseconds
    pub loop_time: DistanceMap,
    /// Settings the run used; `device` says whose ranges `dist` holds
    pub test_info: TestInfo,
}

/// Everything that can go wrong saving or loading a [`ResultFile`].
#[derive(Debug)]
pub enum ResultFileError {
    /// Only `.csv` files are read.
    WrongExtension(PathBuf),

    /// The text is not well-formed CSV.
    CsvError(csv::Error),

    /// A row does not have exactly a key and a value cell.
    MalformedRow(usize),

    /// One of the three rows is missing.
    MissingRow(&'static str),

    /// Opening, creating or flushing the file failed.
    IoError(std::io::Error),

    /// Returned when serialization of a cell fails.
    RonError(ron::Error),

    /// Returned when deserialization of a cell fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ResultFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ResultFileError as RFE;
        let msg = match self {
            RFE::WrongExtension(path) => Cow::from(format!(
                "incorrect file type {}, expected .csv",
                path.display()
            )),
            RFE::CsvError(error) => Cow::from(format!("csv error: {}", error)),
            RFE::MalformedRow(idx) => {
                Cow::from(format!("row {} is not a key and a value", idx + 1))
            }
            RFE::MissingRow(key) => Cow::from(format!("no {} row", key)),
            RFE::IoError(error) => Cow::from(format!("io error: {}", error)),
            RFE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            RFE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ResultFileError {}

impl From<csv::Error> for ResultFileError {
    fn from(value: csv::Error) -> Self {
        Self::CsvError(value)
    }
}

fn to_cell<T: Serialize>(value: &T) -> Result<String, ResultFileError> {
    ron::ser::to_string(value).map_err(ResultFileError::RonError)
}

fn from_cell<T: DeserializeOwned>(cell: &str) -> Result<T, ResultFileError> {
    ron::de::from_str(cell).map_err(ResultFileError::RonSpannedError)
}

impl ResultFile {
    /// Bundle one device's samples with the settings they were taken under.
    pub fn new(dist: DistanceMap, loop_time: DistanceMap, test_info: TestInfo) -> Self {
        Self {
            dist,
            loop_time,
            test_info,
        }
    }

    /// `DW1000_<device>_<testType>_data_Output_(<timestamp>).csv`
    pub fn file_name(&self, timestamp: &DateTime<Local>) -> String {
        let device = self
            .test_info
            .device
            .map(|d| d.to_string())
            .unwrap_or_else(|| "None".to_owned());
        format!(
            "DW1000_{}_{}_data_Output_{}.csv",
            device,
            self.test_info.test_type,
            timestamp.format("(%Y-%m-%d_%H-%M-%S)")
        )
    }

    /// Write into `dir` under a timestamped [`Self::file_name`], returning
    /// the path written.
    pub fn save_in(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ResultFileError> {
        let path = dir.as_ref().join(self.file_name(&Local::now()));
        self.to_path(&path)?;
        Ok(path)
    }

    /// Create or truncate `path` and write the three rows to it.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ResultFileError> {
        let mut handle = File::create(path).map_err(ResultFileError::IoError)?;
        self.to_file(&mut handle)
    }

    /// Write the `distDict`, `loopTimeDict` and `testInfoDict` rows, in that
    /// order.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), ResultFileError> {
        let rows = [
            (DIST_KEY, to_cell(&self.dist)?),
            (LOOP_TIME_KEY, to_cell(&self.loop_time)?),
            (TEST_INFO_KEY, to_cell(&self.test_info)?),
        ];

        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);
        for (key, cell) in rows {
            writer.write_record([key, cell.as_str()])?;
        }
        writer.flush().map_err(ResultFileError::IoError)?;

        Ok(())
    }

    /// Read a result file, refusing anything that does not end in `.csv`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ResultFileError> {
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            return Err(ResultFileError::WrongExtension(path.to_owned()));
        }

        let mut handle = File::open(path).map_err(ResultFileError::IoError)?;
        Self::from_file(&mut handle)
    }

    /// Read the three rows back. Rows may come in any order; unknown rows
    /// are skipped.
    pub fn from_file(file: &mut impl Read) -> Result<Self, ResultFileError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        let rows = reader
            .records()
            .collect::<Result<Vec<StringRecord>, csv::Error>>()?;

        let mut dist = None;
        let mut loop_time = None;
        let mut test_info = None;

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != 2 {
                return Err(ResultFileError::MalformedRow(idx));
            }
            let cell = &row[1];
            match &row[0] {
                DIST_KEY => dist = Some(cell),
                LOOP_TIME_KEY => loop_time = Some(cell),
                TEST_INFO_KEY => test_info = Some(cell),
                key => log::debug!("Ignoring unknown row {:?}", key),
            }
        }

        let dist = dist.ok_or(ResultFileError::MissingRow(DIST_KEY))?;
        let loop_time = loop_time.ok_or(ResultFileError::MissingRow(LOOP_TIME_KEY))?;
        let test_info = test_info.ok_or(ResultFileError::MissingRow(TEST_INFO_KEY))?;

        Ok(Self {
            dist: from_cell(dist)?,
            loop_time: from_cell(loop_time)?,
            test_info: from_cell(test_info)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Device, TestType};
    use crate::distance_map::DistanceKey;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn sample() -> ResultFile {
        let mut dist = DistanceMap::new();
        dist.insert(DistanceKey(5), vec![5.25, 4.875, 5.0]);
        dist.insert(DistanceKey(10), vec![10.1, 9.95, 0.1 + 0.2]);
        let mut loop_time = DistanceMap::new();
        loop_time.insert(DistanceKey(5), vec![101.3, 99.0, 100.25]);
        loop_time.insert(DistanceKey(10), vec![98.0, 102.5, 100.0]);
        let test_info = TestInfo {
            test_type: TestType::DistMeas,
            device: Some(Device::Anchor),
            anchor_port: "/dev/ttyUSB0".to_owned(),
            start_dist: 5,
            stop_dist: 10,
            ..Default::default()
        };
        ResultFile::new(dist, loop_time, test_info)
    }

    #[test]
    fn write_and_read_cursor() {
        let mut buf = Cursor::new(Vec::new());
        let data = sample();

        data.to_file(&mut buf).unwrap();
        let written = buf.get_ref().clone();
        buf.set_position(0);
        let read_data = ResultFile::from_file(&mut buf).unwrap();
        assert_eq!(data, read_data);

        let mut again = Vec::new();
        read_data.to_file(&mut again).unwrap();
        assert_eq!(written, again);
    }

    #[test]
    fn write_and_read_path() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample();
        let path = data.save_in(dir.path()).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("DW1000_anchor_distMeas_data_Output_("));

        let read_data = ResultFile::from_path(&path).unwrap();
        assert_eq!(data, read_data);
    }

    #[test]
    fn file_has_three_quoted_rows() {
        let mut buf = Vec::new();
        sample().to_file(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("distDict,\"{"));
        assert!(lines[0].contains("\"\"5 cm\"\""));
        assert!(lines[1].starts_with("loopTimeDict,"));
        assert!(lines[2].starts_with("testInfoDict,"));
    }

    #[test]
    fn file_name_carries_device_and_type() {
        let ts = Local.with_ymd_and_hms(2017, 8, 9, 14, 57, 3).unwrap();
        assert_eq!(
            sample().file_name(&ts),
            "DW1000_anchor_distMeas_data_Output_(2017-08-09_14-57-03).csv"
        );
    }

    #[test]
    fn wrong_extension_is_refused() {
        let res = ResultFile::from_path("results.xlsx");
        assert!(matches!(res, Err(ResultFileError::WrongExtension(_))));
    }

    #[test]
    fn missing_rows_are_reported() {
        let mut text = Cursor::new(b"distDict,{}\nloopTimeDict,{}\n".to_vec());
        let res = ResultFile::from_file(&mut text);
        assert!(matches!(res, Err(ResultFileError::MissingRow("testInfoDict"))));
    }

    #[test]
    fn extra_cells_are_malformed() {
        let mut text = Cursor::new(b"distDict,{},oops\n".to_vec());
        let res = ResultFile::from_file(&mut text);
        assert!(matches!(res, Err(ResultFileError::MalformedRow(0))));
    }

    #[test]
    fn garbage_cells_do_not_parse() {
        let mut text =
            Cursor::new(b"distDict,{}\nloopTimeDict,{}\ntestInfoDict,not ron at all\n".to_vec());
        let res = ResultFile::from_file(&mut text);
        assert!(matches!(res, Err(ResultFileError::RonSpannedError(_))));
    }

    #[test]
    fn cells_are_quoted_like_a_spreadsheet() {
        let mut buf = Vec::new();
        let data = ResultFile::new(DistanceMap::new(), DistanceMap::new(), TestInfo::default());
        data.to_file(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "distDict,{}");
        assert_eq!(lines[1], "loopTimeDict,{}");
        assert!(lines[2].contains("anchorPort:\"\"\"\""));
    }

    #[test]
    fn reads_a_file_with_a_byte_order_mark() {
        let mut buf = b"\xEF\xBB\xBF".to_vec();
        let data = sample();
        data.to_file(&mut buf).unwrap();
        let read_data = ResultFile::from_file(&mut Cursor::new(buf)).unwrap();
        assert_eq!(data, read_data);
    }

    #[test]
    fn reads_crlf_rows_in_any_order() {
        let mut text = Cursor::new(
            b"loopTimeDict,{}\r\ntestInfoDict,\"(startDist:20)\"\r\ndistDict,{}\r\n"
                .to_vec(),
        );
        let read_data = ResultFile::from_file(&mut text).unwrap();
        assert!(read_data.dist.is_empty());
        assert_eq!(read_data.test_info.start_dist, 20);
    }
}
