// Record file round trips through the public API: versioned schemas, gzip, legacy input.
use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use proptest::prelude::*;
use recfile::api::{
    Alphabet, Compression, Error, ErrorKind, RecordFormat, RecordReader, RecordTime, RecordWriter,
    Sep, WriterOptions,
};

const SCHEMA_VERSION: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
struct Station {
    id: u32,
    offset: i16,
    name: Option<String>,
    gain: f64,
    enabled: bool,
    // Added in version 2.
    label: Option<String>,
    // Added in version 3.
    updated: Option<RecordTime>,
}

impl Station {
    fn sample() -> Self {
        Self {
            id: 4095,
            offset: -12,
            name: Some("north gate".to_string()),
            gain: 1.75,
            enabled: true,
            label: None,
            updated: Some(RecordTime::new(86_400, 2023)),
        }
    }

    fn save(&self, writer: &mut RecordWriter) -> Result<(), Error> {
        writer.write_int(self.id)?;
        writer.write_int(self.offset)?;
        writer.write_string(self.name.as_deref())?;
        writer.write_f64(self.gain)?;
        writer.write_bool(self.enabled)?;
        writer.write_string(self.label.as_deref())?;
        writer.write_time(self.updated)?;
        writer.end_record()
    }

    fn load(reader: &mut RecordReader) -> Result<Self, Error> {
        let version = reader.version();
        Ok(Self {
            id: reader.read_int()?,
            offset: reader.read_int()?,
            name: reader.read_string()?,
            gain: reader.read_f64()?,
            enabled: reader.read_bool()?,
            label: reader.read_string_if(version >= 2)?,
            updated: reader.read_if(version >= 3, |r| r.read_time())?.flatten(),
        })
    }
}

fn save_all(path: &Path, compression: Compression, stations: &[Station]) {
    let options = WriterOptions::new(SCHEMA_VERSION).with_compression(compression);
    let mut writer = RecordWriter::create(path, options).expect("create");
    writer.write_int(stations.len() as u32).expect("count");
    writer.end_record().expect("newline");
    for station in stations {
        station.save(&mut writer).expect("save");
    }
    writer.close().expect("close");
}

fn load_all(path: &Path) -> (RecordReader, Vec<Station>) {
    let mut reader = RecordReader::open(path).expect("open");
    let count = reader.read_int::<u32>().expect("count");
    let stations = (0..count)
        .map(|_| Station::load(&mut reader).expect("load"))
        .collect();
    (reader, stations)
}

#[test]
fn plain_and_gzip_files_load_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stations = vec![
        Station::sample(),
        Station {
            id: 0,
            offset: i16::MIN,
            name: None,
            gain: -0.0625,
            enabled: false,
            label: Some("spare".to_string()),
            updated: None,
        },
    ];

    let plain = dir.path().join("stations.rec");
    let packed = dir.path().join("stations.rec.gz");
    save_all(&plain, Compression::None, &stations);
    save_all(&packed, Compression::Gzip, &stations);

    let raw = std::fs::read(&packed).expect("read gz");
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let (plain_reader, from_plain) = load_all(&plain);
    let (gzip_reader, from_gzip) = load_all(&packed);
    assert_eq!(from_plain, stations);
    assert_eq!(from_gzip, stations);
    assert_eq!(plain_reader.compression(), Compression::None);
    assert_eq!(gzip_reader.compression(), Compression::Gzip);
    assert_eq!(gzip_reader.version(), SCHEMA_VERSION);
}

#[test]
fn version_one_files_skip_later_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("v1.rec");
    let cur = Alphabet::Current;
    let text = format!(
        "vtpos 0 1\n{} {} north_gate 1.75 {}\n",
        cur.encode(7),
        cur.encode(5),
        cur.encode(1)
    );
    std::fs::write(&path, text).expect("write");

    let mut reader = RecordReader::open(&path).expect("open");
    assert_eq!(reader.version(), 1);
    let station = Station::load(&mut reader).expect("load");
    assert_eq!(station.id, 7);
    assert_eq!(station.offset, 5);
    assert_eq!(station.name.as_deref(), Some("north gate"));
    assert_eq!(station.label, None);
    assert_eq!(station.updated, None);
    assert!(!reader.is_eof());
}

fn legacy_text() -> String {
    let legacy = Alphabet::Legacy;
    format!(
        "version_4\n{} {} {}\n",
        legacy.encode(93),
        legacy.encode(0),
        legacy.encode(u64::from(u32::MAX))
    )
}

#[test]
fn gzip_legacy_file_reads_like_plain_legacy_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plain = dir.path().join("old.rec");
    let packed = dir.path().join("old.rec.gz");
    std::fs::write(&plain, legacy_text()).expect("write plain");
    let mut encoder = GzEncoder::new(File::create(&packed).expect("create gz"), GzLevel::default());
    encoder.write_all(legacy_text().as_bytes()).expect("write gz");
    encoder.finish().expect("finish gz");

    for path in [&plain, &packed] {
        let mut reader = RecordReader::open(path).expect("open");
        assert_eq!(reader.format(), Some(RecordFormat::Legacy));
        assert_eq!(reader.version(), 4);
        assert_eq!(reader.read_u64().expect("read"), 93);
        assert_eq!(reader.read_u64().expect("read"), 0);
        assert_eq!(reader.read_int::<u32>().expect("read"), u32::MAX);
        assert_eq!(reader.read_u64().expect("read"), 0);
        assert!(reader.is_eof());
    }
}

#[test]
fn unrecognized_header_is_a_format_error_with_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("junk.rec");
    std::fs::write(&path, "hello world\n").expect("write");
    let err = RecordReader::open(&path).err().expect("should fail");
    assert_eq!(err.kind(), ErrorKind::Format);
    assert_eq!(err.path(), Some(path.as_path()));
}

#[test]
fn truncated_header_is_a_format_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, text) in [("empty.rec", ""), ("short.rec", "vtpos 0"), ("bad.rec", "version_x")] {
        let path = dir.path().join(name);
        std::fs::write(&path, text).expect("write");
        let err = RecordReader::open(&path).err().expect("should fail");
        assert_eq!(err.kind(), ErrorKind::Format, "{name}");
    }
}

#[test]
fn short_file_reads_defaults_after_the_last_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("short.rec");
    save_all(&path, Compression::Gzip, &[Station::sample()]);
    let mut reader = RecordReader::open(&path).expect("open");
    // Claims more stations than the file holds.
    assert_eq!(reader.read_int::<u32>().expect("count"), 1);
    let first = Station::load(&mut reader).expect("load");
    assert_eq!(first, Station::sample());
    assert!(!reader.is_eof());
    let missing = Station::load(&mut reader).expect("load past end");
    assert!(reader.is_eof());
    assert_eq!(missing.id, 0);
    assert_eq!(missing.name, None);
    assert_eq!(missing.gain, 0.0);
    assert!(!missing.enabled);
    assert_eq!(missing.updated, None);
}

#[test]
fn cut_gzip_file_reads_as_a_short_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cut.rec.gz");
    let expected = (0..2000u64).map(|i| i * 7919 + 1).collect::<Vec<_>>();
    let mut writer = RecordWriter::create(
        &path,
        WriterOptions::new(1).with_compression(Compression::Gzip),
    )
    .expect("create");
    for value in &expected {
        writer.put_value(*value, Sep::Space).expect("put");
    }
    writer.close().expect("close");

    let full = std::fs::read(&path).expect("read");
    std::fs::write(&path, &full[..full.len() * 2 / 3]).expect("cut");

    let mut reader = RecordReader::open(&path).expect("open");
    let values = (0..2100)
        .map(|_| reader.read_u64().expect("read after cut"))
        .collect::<Vec<_>>();
    assert!(reader.is_eof());
    let intact = values
        .iter()
        .zip(&expected)
        .take_while(|(got, want)| got == want)
        .count();
    assert!(intact > 0, "nothing survived the cut");
    assert!(intact < expected.len());
    assert!(values[intact + 1..].iter().all(|&value| value == 0));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = RecordReader::open(dir.path().join("absent.rec"))
        .err()
        .expect("should fail");
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn writer_output_is_reproducible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = dir.path().join("a.rec");
    let second = dir.path().join("b.rec");
    save_all(&first, Compression::None, &[Station::sample()]);
    save_all(&second, Compression::None, &[Station::sample()]);
    assert_eq!(
        std::fs::read(&first).expect("read a"),
        std::fs::read(&second).expect("read b")
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn typed_values_survive_a_file_round_trip(
        wide in any::<u64>(),
        narrow in any::<i32>(),
        flag in any::<bool>(),
        gain in -1.0e12f64..1.0e12f64,
        text in "[a-zA-Z0-9 .:/-]{1,24}",
        compressed in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prop.rec");
        let compression = if compressed { Compression::Gzip } else { Compression::None };
        let mut writer = RecordWriter::create(&path, WriterOptions::new(9).with_compression(compression))
            .expect("create");
        writer.write_int(wide).expect("wide");
        writer.write_int(narrow).expect("narrow");
        writer.write_bool(flag).expect("flag");
        writer.write_f64(gain).expect("gain");
        writer.write_str(&text).expect("text");
        writer.close().expect("close");

        let mut reader = RecordReader::open(&path).expect("open");
        prop_assert_eq!(reader.version(), 9);
        prop_assert_eq!(reader.read_u64().expect("wide"), wide);
        prop_assert_eq!(reader.read_int::<i32>().expect("narrow"), narrow);
        prop_assert_eq!(reader.read_bool().expect("flag"), flag);
        prop_assert_eq!(reader.read_f64().expect("gain"), gain);
        prop_assert_eq!(reader.read_string().expect("text"), Some(text));
        prop_assert!(!reader.is_eof());
    }
}
