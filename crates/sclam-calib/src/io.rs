use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use sclam_lie::Pose2D;

use crate::stream::{StreamError, TimedSample, TimestampedPoseStream};

/// Values per camera trajectory record, a row-major 4x4 pose.
const CAMERA_RECORD_LEN: usize = 16;

/// Error types for the log readers.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Error reading the file
    #[error("error reading file")]
    IoError(#[from] std::io::Error),

    /// A line could not be parsed
    #[error("parse error at line {line}: {message}")]
    ParseError {
        /// 1-based line number
        line: usize,
        /// what went wrong
        message: String,
    },

    /// The file holds fewer records than expected
    #[error("expected {expected} records, found {found}")]
    MissingRecords {
        /// number of records requested
        expected: usize,
        /// number of complete records found
        found: usize,
    },

    /// A parsed sample could not be added to its stream
    #[error("invalid sample in record {record}")]
    Stream {
        /// 1-based record number, the line number for line based logs
        record: usize,
        /// stream error
        #[source]
        source: StreamError,
    },
}

/// Read a list of timestamps, one per non-empty line.
///
/// # Arguments
///
/// * `path` - The path to the timestamp file, e.g. `votimes.txt`.
///
/// # Returns
///
/// The timestamps in file order.
pub fn read_timestamps(path: impl AsRef<Path>) -> Result<Vec<f64>, ReadError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut times = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let token = trimmed.split_whitespace().next().unwrap_or(trimmed);
        times.push(parse_part(token, idx + 1)?);
    }

    Ok(times)
}

/// Read a wheel odometry log.
///
/// Two record layouts are accepted, one per line:
///
/// * CARMEN: `ODOM x y theta tv rv accel timestamp [hostname logger_timestamp]`
/// * plain: `timestamp x y theta`
///
/// Blank lines, `#` comments and other CARMEN messages are skipped.
pub fn read_odometry(path: impl AsRef<Path>) -> Result<TimestampedPoseStream, ReadError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut stream = TimestampedPoseStream::new();
    let mut skipped = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let parts = line.split_whitespace().collect::<Vec<_>>();

        let Some(&first) = parts.first() else {
            continue;
        };
        if first.starts_with('#') {
            continue;
        }

        let sample = if first == "ODOM" {
            parse_carmen_odom(&parts, line_no)?
        } else if first.parse::<f64>().is_ok() {
            parse_plain_odom(&parts, line_no)?
        } else {
            skipped += 1;
            continue;
        };

        stream.add(sample).map_err(|source| ReadError::Stream {
            record: line_no,
            source,
        })?;
    }

    if skipped > 0 {
        log::debug!("skipped {skipped} non odometry records");
    }

    Ok(stream)
}

/// `ODOM x y theta tv rv accel timestamp ...`
fn parse_carmen_odom(parts: &[&str], line: usize) -> Result<TimedSample, ReadError> {
    if parts.len() < 8 {
        return Err(ReadError::ParseError {
            line,
            message: format!("ODOM record needs at least 8 fields, got {}", parts.len()),
        });
    }
    let x = parse_part(parts[1], line)?;
    let y = parse_part(parts[2], line)?;
    let theta = parse_part(parts[3], line)?;
    let timestamp = parse_part(parts[7], line)?;
    Ok(TimedSample::new(timestamp, Pose2D::from_xytheta(x, y, theta)))
}

/// `timestamp x y theta`
fn parse_plain_odom(parts: &[&str], line: usize) -> Result<TimedSample, ReadError> {
    if parts.len() != 4 {
        return Err(ReadError::ParseError {
            line,
            message: format!("expected `timestamp x y theta`, got {} fields", parts.len()),
        });
    }
    let timestamp = parse_part(parts[0], line)?;
    let x = parse_part(parts[1], line)?;
    let y = parse_part(parts[2], line)?;
    let theta = parse_part(parts[3], line)?;
    Ok(TimedSample::new(timestamp, Pose2D::from_xytheta(x, y, theta)))
}

/// Read a camera trajectory of row-major 4x4 poses and map it to planar robot poses.
///
/// The camera frame is x-right, y-down, z-forward. Record `i` becomes the robot
/// frame pose `(m[2][3], -m[0][3], atan2(-m[0][2], m[2][2]))`, composed on the
/// left with `init_offset` and stamped with `times[i]`. Records beyond
/// `times.len()` are ignored.
pub fn read_camera_trajectory(
    path: impl AsRef<Path>,
    times: &[f64],
    init_offset: &Pose2D,
) -> Result<TimestampedPoseStream, ReadError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let wanted = times.len() * CAMERA_RECORD_LEN;
    let mut values: Vec<f64> = Vec::with_capacity(wanted);

    'lines: for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        for token in line.split_whitespace() {
            if values.len() == wanted {
                break 'lines;
            }
            values.push(parse_part(token, idx + 1)?);
        }
    }

    if values.len() < wanted {
        return Err(ReadError::MissingRecords {
            expected: times.len(),
            found: values.len() / CAMERA_RECORD_LEN,
        });
    }

    let mut stream = TimestampedPoseStream::new();
    for (i, (record, &timestamp)) in values.chunks_exact(CAMERA_RECORD_LEN).zip(times).enumerate() {
        let m = |row: usize, col: usize| record[row * 4 + col];
        let camera = Pose2D::from_xytheta(m(2, 3), -m(0, 3), (-m(0, 2)).atan2(m(2, 2)));
        stream
            .add(TimedSample::new(timestamp, *init_offset * camera))
            .map_err(|source| ReadError::Stream {
                record: i + 1,
                source,
            })?;
    }

    Ok(stream)
}

fn parse_part<T: std::str::FromStr>(s: &str, line: usize) -> Result<T, ReadError>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|e| ReadError::ParseError {
        line,
        message: format!("{s}: {e}"),
    })
}
