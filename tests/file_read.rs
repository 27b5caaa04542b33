mod support;

use deferred_bus::producer::{read_file, read_to_string, FileReader, ThreadFileReader};
use deferred_bus::{ReadError, SettleError, ThreadScheduler};
use futures::executor::block_on;
use std::io::{self, Write};
use support::Recorder;

#[test]
fn reads_file_contents_without_blocking_the_caller() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "hello from the text file").unwrap();

    let scheduler = ThreadScheduler::spawn().unwrap();
    let log = Recorder::new();

    log.push("started first task - file read");
    let contents = read_to_string(scheduler.clone(), file.path());
    log.push("started next task");

    let text = block_on(contents.settled()).unwrap();
    log.push(text);
    log.push("complete first task - file read");

    assert_eq!(
        log.entries(),
        vec![
            "started first task - file read",
            "started next task",
            "hello from the text file",
            "complete first task - file read",
        ]
    );
    scheduler.shutdown();
}

#[test]
fn missing_file_is_reported_not_swallowed() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("content").join("textFile.txt");
    let scheduler = ThreadScheduler::spawn().unwrap();

    let err = block_on(read_file(scheduler.clone(), &path).settled())
        .unwrap_err()
        .into_rejection()
        .unwrap();

    assert_eq!(err.kind, io::ErrorKind::NotFound);
    assert_eq!(err.path, path);
    scheduler.shutdown();
}

#[test]
fn invalid_utf8_rejects_as_invalid_data() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
    let scheduler = ThreadScheduler::spawn().unwrap();

    let result = block_on(read_to_string(scheduler.clone(), file.path()).settled());

    match result {
        Err(SettleError::Rejected(ReadError { kind, .. })) => {
            assert_eq!(kind, io::ErrorKind::InvalidData)
        }
        other => panic!("expected invalid data rejection, got {:?}", other),
    }
    scheduler.shutdown();
}

#[test]
fn thread_reader_is_usable_behind_the_trait() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"bytes").unwrap();
    let scheduler = ThreadScheduler::spawn().unwrap();

    let reader: Box<dyn FileReader> = Box::new(ThreadFileReader::new(scheduler.clone()));
    let bytes = block_on(reader.read(file.path()).settled()).unwrap();

    assert_eq!(bytes, b"bytes".to_vec());
    scheduler.shutdown();
}
