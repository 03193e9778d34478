use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use grabber_core::engine::{CaptureState, StopReason};
use grabber_core::source::DataSink;
use grabber_core::{
    CaptureConfig, CaptureSession, Flow, GrabberError, ProgressReport, ReaderSource,
    TransferSource,
};
use parking_lot::Mutex;

/// In-memory output file shared with the writer thread.
#[derive(Clone, Default)]
struct SharedFile(Arc<Mutex<Vec<u8>>>);

impl SharedFile {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Replays fixed bursts, with a progress report after each one.
struct ScriptedSource {
    bursts: Vec<Vec<u8>>,
    calls: usize,
    fail_at_end: bool,
}

impl ScriptedSource {
    fn new(bursts: Vec<Vec<u8>>) -> Self {
        Self {
            bursts,
            calls: 0,
            fail_at_end: false,
        }
    }
}

impl TransferSource for ScriptedSource {
    fn stream(&mut self, sink: &mut DataSink<'_>) -> grabber_core::error::Result<()> {
        let mut total = 0u64;
        for (i, burst) in self.bursts.iter().enumerate() {
            self.calls += 1;
            total += burst.len() as u64;
            if sink(burst, None).is_stop() {
                return Ok(());
            }
            let progress = ProgressReport {
                elapsed_secs: (i + 1) as f64,
                total_bytes: total,
                period_bytes: burst.len() as u64,
                current_rate: burst.len() as f64,
                total_rate: total as f64 / (i + 1) as f64,
            };
            if sink(&[], Some(&progress)).is_stop() {
                return Ok(());
            }
        }
        if self.fail_at_end {
            return Err(GrabberError::Transfer("device vanished".into()));
        }
        Ok(())
    }
}

/// Blocks in `write` until released, so the queue backs up behind it.
struct GatedFile {
    inner: SharedFile,
    gate: Arc<Mutex<()>>,
}

impl Write for GatedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _open = self.gate.lock();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sample codes `abc` / `def` with the FIFO bit clear of errors.
fn sample_byte(code0: u8, code1: u8) -> u8 {
    (code0 << 5) | (code1 << 2) | 0b01
}

const TABLE: [i8; 8] = [1, 3, 5, 7, -1, -3, -5, -7];

#[test]
fn end_to_end_writes_two_samples_per_live_byte() {
    let mut stream = vec![0xffu8; 50_000];
    let mut expected = Vec::new();
    for i in 0..100u8 {
        let (c0, c1) = (i % 8, (i / 8) % 8);
        stream.push(sample_byte(c0, c1));
        expected.push(TABLE[c0 as usize] as u8);
        expected.push(TABLE[c1 as usize] as u8);
    }
    assert_eq!(stream.len(), 50_100);

    let file = SharedFile::default();
    let session = CaptureSession::new(CaptureConfig::default());
    let mut source = ScriptedSource::new(stream.chunks(4_096).map(<[u8]>::to_vec).collect());

    let summary = session.run(&mut source, Some(file.clone())).unwrap();

    let written = file.contents();
    assert_eq!(written.len(), 200);
    assert_eq!(written, expected);
    assert_eq!(summary.stats.bytes_received, 50_100);
    assert_eq!(summary.stats.bytes_saved, 100);
    assert_eq!(summary.stats.bytes_written, 200);
    assert_eq!(summary.stop_reason, Some(StopReason::TransferEnded));
    assert!(summary.write_error.is_none());
}

#[test]
fn overflow_stops_session_and_keeps_the_rest_of_its_burst() {
    let config = CaptureConfig {
        warm_up_bytes: 0,
        ..CaptureConfig::default()
    };
    let good = sample_byte(0b011, 0b100); // +7, -1
    let mut first = vec![good; 1_000];
    first.extend_from_slice(&[good; 10]);
    first.push(0b0000_0000); // FIFO error
    first.extend_from_slice(&[good; 20]);
    let bursts = vec![first, vec![good; 1_000], vec![good; 1_000]];

    let file = SharedFile::default();
    let session = CaptureSession::new(config);
    let mut source = ScriptedSource::new(bursts);

    let summary = session.run(&mut source, Some(file.clone())).unwrap();

    assert_eq!(source.calls, 1, "transfer layer must halt after the overflow burst");
    assert_eq!(
        summary.stop_reason,
        Some(StopReason::HardwareOverflow { byte_offset: 1_010 })
    );
    assert_eq!(summary.stats.dropouts, 1);
    // the flagged byte is the only one dropped from the burst
    assert_eq!(summary.stats.bytes_saved, 1_030);

    let written = file.contents();
    assert_eq!(written.len(), 2 * 1_030);
    assert!(written.chunks(2).all(|pair| pair == [7u8, (-1i8) as u8]));
}

/// Simulates Ctrl-C arriving while the transfer layer is mid-stream.
struct InterruptingSource {
    bursts: Vec<Vec<u8>>,
    interrupt_at: usize,
    stop: Arc<CaptureState>,
    calls: usize,
}

impl TransferSource for InterruptingSource {
    fn stream(&mut self, sink: &mut DataSink<'_>) -> grabber_core::error::Result<()> {
        for (i, burst) in self.bursts.iter().enumerate() {
            if i == self.interrupt_at {
                self.stop.request_stop(StopReason::UserInterrupt);
            }
            self.calls += 1;
            if sink(burst, None).is_stop() {
                return Ok(());
            }
        }
        Ok(())
    }
}

#[test]
fn user_interrupt_drains_backlog_before_returning() {
    let config = CaptureConfig {
        warm_up_bytes: 0,
        write_slice_bytes: 13,
        write_buffer_bytes: 512,
        ..CaptureConfig::default()
    };
    let session = CaptureSession::new(config);

    let inner = SharedFile::default();
    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock();
    let file = GatedFile {
        inner: inner.clone(),
        gate: Arc::clone(&gate),
    };

    let good = sample_byte(0b000, 0b111); // +1, -7
    let mut source = InterruptingSource {
        bursts: (0..40).map(|_| vec![good; 500]).collect(),
        interrupt_at: 10,
        stop: session.stop_handle(),
        calls: 0,
    };

    // The writer blocks on the gate, so the queue holds a backlog at stop time.
    let run = thread::spawn(move || {
        let summary = session.run(&mut source, Some(file));
        (summary, source.calls)
    });
    thread::sleep(Duration::from_millis(50));
    drop(held);

    let (summary, calls) = run.join().unwrap();
    let summary = summary.unwrap();

    // the burst delivered alongside the interrupt is kept
    assert_eq!(calls, 11);
    assert_eq!(summary.stop_reason, Some(StopReason::UserInterrupt));
    assert_eq!(summary.stats.bytes_saved, 11 * 500);
    assert_eq!(summary.stats.bytes_written, 2 * 11 * 500);

    let written = inner.contents();
    assert_eq!(written.len(), 2 * 11 * 500);
    assert!(written.chunks(2).all(|pair| pair == [1u8, (-7i8) as u8]));
}

#[test]
fn queued_bytes_are_written_even_with_a_slow_disk() {
    let config = CaptureConfig {
        warm_up_bytes: 0,
        write_slice_bytes: 50,
        ..CaptureConfig::default()
    };
    let session = CaptureSession::new(config);

    let inner = SharedFile::default();
    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock();
    let file = GatedFile {
        inner: inner.clone(),
        gate: Arc::clone(&gate),
    };

    let good = sample_byte(0b101, 0b010); // -3, +5
    let bursts: Vec<Vec<u8>> = (0..50).map(|_| vec![good; 1_000]).collect();
    let mut source = ScriptedSource::new(bursts);

    let run = thread::spawn(move || session.run(&mut source, Some(file)));
    thread::sleep(Duration::from_millis(50));
    drop(held);

    let summary = run.join().unwrap().unwrap();
    assert_eq!(summary.stats.bytes_saved, 50_000);
    assert_eq!(summary.stats.bytes_written, 100_000);

    let written = inner.contents();
    assert_eq!(written.len(), 100_000);
    assert!(written.chunks(2).all(|pair| pair == [(-3i8) as u8, 5]));
}

#[test]
fn bounded_queue_delivers_the_same_stream() {
    let config = CaptureConfig {
        warm_up_bytes: 100,
        queue_capacity: 64,
        write_slice_bytes: 17,
        ..CaptureConfig::default()
    };
    let stream: Vec<u8> = (0..20_100u32).map(|i| ((i as u8) | 0x01)).collect();
    let expected: Vec<u8> = stream[100..]
        .iter()
        .flat_map(|&b| grabber_core::decode(b).to_bytes())
        .collect();

    let file = SharedFile::default();
    let session = CaptureSession::new(config);
    let mut source = ReaderSource::new(io::Cursor::new(stream), 333);

    let summary = session.run(&mut source, Some(file.clone())).unwrap();

    assert_eq!(summary.stats.bytes_saved, 20_000);
    assert_eq!(file.contents(), expected);
}

#[test]
fn write_failure_ends_the_session() {
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }
    }

    let config = CaptureConfig {
        warm_up_bytes: 0,
        // smaller than one burst so the BufWriter hits the disk immediately
        write_buffer_bytes: 512,
        ..CaptureConfig::default()
    };
    let session = CaptureSession::new(config);
    let good = sample_byte(0, 0);
    let bursts: Vec<Vec<u8>> = (0..2_000).map(|_| vec![good; 4_096]).collect();
    let mut source = ScriptedSource::new(bursts);

    let summary = session.run(&mut source, Some(FullDisk)).unwrap();

    assert_eq!(summary.stop_reason, Some(StopReason::WriteFailed));
    assert!(summary.write_error.is_some());
    assert!(source.calls < 2_000, "acquisition kept running after a write failure");
}

#[test]
fn transfer_error_without_stop_is_reported() {
    let session = CaptureSession::new(CaptureConfig {
        warm_up_bytes: 0,
        ..CaptureConfig::default()
    });
    let mut source = ScriptedSource::new(vec![vec![sample_byte(1, 1); 10]]);
    source.fail_at_end = true;

    let file = SharedFile::default();
    let outcome = session.run(&mut source, Some(file.clone()));

    assert!(matches!(outcome, Err(GrabberError::Transfer(_))));
    assert_eq!(file.contents(), vec![3u8; 20]);
}

#[test]
fn throughput_mode_runs_without_output_file() {
    let session = CaptureSession::new(CaptureConfig {
        warm_up_bytes: 10,
        ..CaptureConfig::default()
    });
    let mut source = ScriptedSource::new(vec![vec![0xffu8; 64]; 4]);

    let summary = session
        .run::<_, SharedFile>(&mut source, None)
        .unwrap();

    assert_eq!(summary.stats.bytes_received, 256);
    assert_eq!(summary.stats.bytes_saved, 0);
    assert_eq!(summary.stop_reason, Some(StopReason::TransferEnded));
    assert_eq!(source.calls, 4);
}

#[test]
fn source_sees_stop_on_the_next_callback() {
    struct Endless;

    impl TransferSource for Endless {
        fn stream(&mut self, sink: &mut DataSink<'_>) -> grabber_core::error::Result<()> {
            loop {
                if sink(&[0x01; 256], None) == Flow::Stop {
                    return Ok(());
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    let session = CaptureSession::new(CaptureConfig {
        warm_up_bytes: 0,
        ..CaptureConfig::default()
    });
    let stop = session.stop_handle();
    let file = SharedFile::default();

    let run = {
        let file = file.clone();
        thread::spawn(move || session.run(&mut Endless, Some(file)))
    };
    thread::sleep(Duration::from_millis(50));
    stop.request_stop(StopReason::UserInterrupt);

    let summary = run.join().unwrap().unwrap();
    assert_eq!(summary.stop_reason, Some(StopReason::UserInterrupt));
    assert_eq!(file.contents().len() as u64, summary.stats.bytes_saved * 2);
}
