// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Persisted tracing file format: a binary blob of concatenated `int64`
//! values — first `N` event tags, then `N` timestamps. The host owns
//! serialization; the ring buffer itself is timestamp-agnostic (see
//! `tracing_ring`), so the caller supplies one timestamp per drained event.

use std::io::{self, Read, Write};

use crate::tracing_ring::{TraceEvent, TraceTag};

fn tag_code(tag: TraceTag) -> i64 {
    match tag {
        TraceTag::Calibration => 0,
        TraceTag::NodeStart => 1,
        TraceTag::NodeFinish => 2,
        TraceTag::BlockStart => 3,
        TraceTag::BlockWait => 4,
        TraceTag::BlockExit => 5,
    }
}

fn code_tag(code: i64) -> io::Result<TraceTag> {
    match code {
        0 => Ok(TraceTag::Calibration),
        1 => Ok(TraceTag::NodeStart),
        2 => Ok(TraceTag::NodeFinish),
        3 => Ok(TraceTag::BlockStart),
        4 => Ok(TraceTag::BlockWait),
        5 => Ok(TraceTag::BlockExit),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown trace tag code {other}"),
        )),
    }
}

/// Write `events` paired with `timestamps` (same length) as concatenated
/// `int64`s: all tags first, then all timestamps.
pub fn write_trace_file<W: Write>(mut writer: W, events: &[TraceEvent], timestamps: &[i64]) -> io::Result<()> {
    assert_eq!(
        events.len(),
        timestamps.len(),
        "write_trace_file requires one timestamp per event"
    );

    for event in events {
        writer.write_all(&tag_code(event.tag).to_le_bytes())?;
    }
    for timestamp in timestamps {
        writer.write_all(&timestamp.to_le_bytes())?;
    }
    Ok(())
}

/// Read back a file written by `write_trace_file`, given the event count
/// `n` (the format carries no length prefix — callers track `n`
/// out-of-band, as the host does when it drains the ring buffer).
///
/// Only the tag is recoverable this way; `funcID`/`a`/`b`/`nodeIdx` are not
/// part of the persisted format and come back zeroed.
pub fn read_trace_file<R: Read>(mut reader: R, n: usize) -> io::Result<(Vec<TraceTag>, Vec<i64>)> {
    let mut tag_buf = vec![0u8; n * 8];
    reader.read_exact(&mut tag_buf)?;
    let tags = tag_buf
        .chunks_exact(8)
        .map(|chunk| code_tag(i64::from_le_bytes(chunk.try_into().unwrap())))
        .collect::<io::Result<Vec<_>>>()?;

    let mut ts_buf = vec![0u8; n * 8];
    reader.read_exact(&mut ts_buf)?;
    let timestamps = ts_buf
        .chunks_exact(8)
        .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();

    Ok((tags, timestamps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_an_in_memory_buffer() {
        let events = vec![
            TraceEvent::calibration(),
            TraceEvent::node_start(7, 0),
            TraceEvent::block_exit(2),
        ];
        let timestamps = vec![100, 150, 200];

        let mut buf = Vec::new();
        write_trace_file(&mut buf, &events, &timestamps).unwrap();

        let (tags, read_timestamps) = read_trace_file(&buf[..], events.len()).unwrap();
        assert_eq!(tags, vec![TraceTag::Calibration, TraceTag::NodeStart, TraceTag::BlockExit]);
        assert_eq!(read_timestamps, timestamps);
    }

    #[test]
    fn tags_are_written_before_any_timestamp() {
        let events = vec![TraceEvent::calibration(), TraceEvent::calibration()];
        let timestamps = vec![-1, -2];
        let mut buf = Vec::new();
        write_trace_file(&mut buf, &events, &timestamps).unwrap();

        assert_eq!(buf.len(), 32);
        assert_eq!(i64::from_le_bytes(buf[16..24].try_into().unwrap()), -1);
        assert_eq!(i64::from_le_bytes(buf[24..32].try_into().unwrap()), -2);
    }

    #[test]
    #[should_panic(expected = "one timestamp per event")]
    fn mismatched_lengths_panic() {
        let mut buf = Vec::new();
        write_trace_file(&mut buf, &[TraceEvent::calibration()], &[]).unwrap();
    }
}
