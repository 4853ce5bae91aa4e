use bytes::Bytes;
use recpack::{
    from_msgpack, from_msgpack_with, read_session, read_shared_session, to_bytes, to_msgpack,
    write_session, CodecError, Decoder, Extension, ReaderConfig, Record, Serializable,
    StreamError, Union,
};

const STATUS_EXT_KIND: i8 = 0x2a;

// RUST_LOG=recpack=trace shows the session and skip events
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupStatus {
    Clear = 0,
    Fail = 1,
    Warn = 2,
    Info = 3,
}

#[derive(Union, Debug, Clone, PartialEq)]
enum IoData {
    Flag(bool),
    Value(f64),
}

impl Default for IoData {
    fn default() -> Self {
        IoData::Flag(false)
    }
}

#[derive(Record, Default, Debug, Clone, PartialEq)]
struct Io {
    name: String,
    data: IoData,
}

#[derive(Record, Default, Debug, Clone, PartialEq)]
struct GroupError {
    #[record(rename = "Name")]
    name: String,
    #[record(rename = "Type")]
    kind: String,
    #[record(rename = "Error")]
    error: String,
}

#[derive(Record, Debug, Clone, PartialEq)]
struct IoGroup {
    #[record(rename = "Name")]
    name: String,
    #[record(rename = "TimeRecorded")]
    time_recorded: u64,
    #[record(rename = "Fail")]
    is_fail: bool,
    #[record(rename = "IOs")]
    ios: Vec<Io>,
    #[record(rename = "Errors")]
    errors: Vec<GroupError>,
    #[record(rename = "Status")]
    status: Extension<1>,
}

impl Default for IoGroup {
    fn default() -> Self {
        Self {
            name: String::new(),
            time_recorded: 0,
            is_fail: false,
            ios: Vec::new(),
            errors: Vec::new(),
            status: Extension::new(STATUS_EXT_KIND),
        }
    }
}

impl IoGroup {
    fn set_status(&mut self, status: GroupStatus) {
        self.status.data[0] = status as u8;
    }

    fn status(&self) -> Option<GroupStatus> {
        match self.status.data[0] {
            0 => Some(GroupStatus::Clear),
            1 => Some(GroupStatus::Fail),
            2 => Some(GroupStatus::Warn),
            3 => Some(GroupStatus::Info),
            _ => None,
        }
    }
}

#[derive(Record, Default, Debug, Clone, PartialEq)]
struct Message {
    #[record(rename = "EndpointId")]
    endpoint_id: String,
    #[record(rename = "CurrentTime")]
    current_time: u64,
    #[record(rename = "IOGroups")]
    io_groups: Vec<IoGroup>,
}

fn sample_message() -> Message {
    let mut group = IoGroup {
        name: "Group1".to_string(),
        time_recorded: 1_622_547_800,
        is_fail: false,
        ios: vec![
            Io {
                name: "IO1".to_string(),
                data: IoData::Flag(true),
            },
            Io {
                name: "IO2".to_string(),
                data: IoData::Value(200.0),
            },
        ],
        errors: vec![GroupError {
            name: "Error1".to_string(),
            kind: "Type1".to_string(),
            error: "Error message 1".to_string(),
        }],
        ..IoGroup::default()
    };
    group.set_status(GroupStatus::Warn);
    Message {
        endpoint_id: "Endpoint123".to_string(),
        current_time: 1_622_547_800,
        io_groups: vec![group],
    }
}

#[test]
fn test_message_graph_roundtrip_through_fixed_buffer() {
    init_tracing();
    let message = sample_message();
    let mut buffer = [0u8; 1024];
    let len = to_msgpack(&mut buffer, &message).unwrap();
    assert!(len > 0 && len < 1024);

    let mut restored = Message::default();
    from_msgpack(&buffer, &mut restored).unwrap();
    assert_eq!(restored, message);

    let group = &restored.io_groups[0];
    assert_eq!(group.status(), Some(GroupStatus::Warn));
    assert_eq!(group.status.kind, STATUS_EXT_KIND);
    assert_eq!(group.ios[0].data, IoData::Flag(true));
    assert_eq!(group.ios[1].data, IoData::Value(200.0));
}

#[test]
fn test_buffer_too_small_fails() {
    init_tracing();
    let message = sample_message();
    let mut buffer = [0u8; 32];
    match to_msgpack(&mut buffer, &message) {
        Err(CodecError::MalformedStream(StreamError::BufferFull { capacity, needed })) => {
            assert_eq!(capacity, 32);
            assert!(needed > 32);
        }
        other => panic!("expected BufferFull, got {:?}", other),
    }
}

#[test]
fn test_heterogeneous_records_as_trait_objects() {
    let error = GroupError {
        name: "E".to_string(),
        kind: "T".to_string(),
        error: "boom".to_string(),
    };
    let io = Io {
        name: "IO9".to_string(),
        data: IoData::Value(-4.5),
    };
    let values: Vec<&dyn Serializable> = vec![&error, &io];

    let mut buffers = Vec::new();
    for value in &values {
        let mut buffer = vec![0u8; 128];
        let len = to_msgpack(&mut buffer, *value).unwrap();
        buffer.truncate(len);
        buffers.push(buffer);
    }

    let mut restored_error = GroupError::default();
    let mut restored_io = Io::default();
    let targets: [&mut dyn Serializable; 2] = [&mut restored_error, &mut restored_io];
    for (target, buffer) in targets.into_iter().zip(&buffers) {
        from_msgpack(buffer, target).unwrap();
    }
    assert_eq!(restored_error, error);
    assert_eq!(restored_io, io);
}

#[test]
fn test_from_msgpack_rejects_wrong_shape() {
    let mut buffer = [0u8; 16];
    let len = write_session(&mut buffer, |writer| writer.write_str("plain")).unwrap();

    let mut io = Io::default();
    assert!(matches!(
        from_msgpack(&buffer[..len], &mut io),
        Err(CodecError::TypeMismatch { .. })
    ));
}

#[test]
fn test_empty_buffer_is_malformed() {
    let mut io = Io::default();
    assert!(matches!(
        from_msgpack(&[], &mut io),
        Err(CodecError::MalformedStream(StreamError::InsufficientData { .. }))
    ));
}

#[test]
fn test_write_session_refuses_open_aggregates() {
    let mut buffer = [0u8; 16];
    let result = write_session(&mut buffer, |writer| writer.start_array(2));
    assert!(matches!(result, Err(CodecError::SessionFinalize { open: 1 })));
}

#[test]
fn test_body_error_wins_over_finalize() {
    init_tracing();
    let mut buffer = [0u8; 16];
    let result = write_session(&mut buffer, |writer| {
        writer.start_map(1)?;
        writer.write_str("this key does not fit the buffer")
    });
    assert!(matches!(
        result,
        Err(CodecError::MalformedStream(StreamError::BufferFull { .. }))
    ));

    let result: recpack::Result<()> = read_session(&[0x91, 0xc2], ReaderConfig::default(), |reader| {
        reader.start_array()?;
        let _: u8 = recpack::Decoder::decode(reader)?;
        Ok(())
    });
    assert!(matches!(result, Err(CodecError::TypeMismatch { .. })));
}

#[derive(Record, Default, Debug, PartialEq)]
struct Blob {
    label: String,
    payload: Bytes,
}

#[test]
fn test_shared_session_reads_in_place() {
    let blob = Blob {
        label: "frame".to_string(),
        payload: Bytes::from_static(&[7; 64]),
    };
    let encoded = to_bytes(&blob).unwrap();
    let range = encoded.as_ptr() as usize..encoded.as_ptr() as usize + encoded.len();

    let shared: Blob =
        read_shared_session(encoded.clone(), ReaderConfig::default(), Blob::decode).unwrap();
    assert_eq!(shared, blob);
    assert!(range.contains(&(shared.payload.as_ptr() as usize)));

    // the slice entry point owns a copy
    let copied: Blob = read_session(&encoded, ReaderConfig::default(), Blob::decode).unwrap();
    assert_eq!(copied, blob);
    assert!(!range.contains(&(copied.payload.as_ptr() as usize)));
}

#[derive(Record, Default, Debug, PartialEq)]
struct Node {
    children: Vec<Node>,
}

fn nested_nodes(levels: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; 4096];
    let len = write_session(&mut buffer, |writer| {
        for _ in 0..levels {
            writer.start_map(1)?;
            writer.write_str("children")?;
            writer.start_array(1)?;
        }
        writer.start_map(0)?;
        writer.finish_map()?;
        for _ in 0..levels {
            writer.finish_array()?;
            writer.finish_map()?;
        }
        Ok(())
    })
    .unwrap();
    buffer.truncate(len);
    buffer
}

#[test]
fn test_depth_guard() {
    let mut node = Node::default();
    from_msgpack(&nested_nodes(10), &mut node).unwrap();
    assert_eq!(node.children.len(), 1);

    // each level opens a map and an array
    let mut node = Node::default();
    assert!(matches!(
        from_msgpack(&nested_nodes(100), &mut node),
        Err(CodecError::DepthLimitExceeded { limit: 128 })
    ));

    let shallow = ReaderConfig {
        max_depth: 8,
        ..ReaderConfig::default()
    };
    let mut node = Node::default();
    assert!(matches!(
        from_msgpack_with(&nested_nodes(10), &mut node, shallow),
        Err(CodecError::DepthLimitExceeded { limit: 8 })
    ));
}

#[derive(Record, Default, Debug, PartialEq)]
struct Chain {
    next: Option<Box<Chain>>,
}

fn chain(levels: usize) -> Chain {
    let mut node = Chain::default();
    for _ in 0..levels {
        node = Chain {
            next: Some(Box::new(node)),
        };
    }
    node
}

#[test]
fn test_default_depth_in_record_terms() {
    // root map, then an array and a map per level
    let mut node = Node::default();
    from_msgpack(&nested_nodes(63), &mut node).unwrap();
    let mut node = Node::default();
    assert!(matches!(
        from_msgpack(&nested_nodes(64), &mut node),
        Err(CodecError::DepthLimitExceeded { limit: 128 })
    ));

    // directly nested records cost one level each
    let mut buffer = vec![0u8; 4096];
    let len = to_msgpack(&mut buffer, &chain(127)).unwrap();
    let mut restored = Chain::default();
    from_msgpack(&buffer[..len], &mut restored).unwrap();
    assert_eq!(restored, chain(127));

    let len = to_msgpack(&mut buffer, &chain(128)).unwrap();
    let mut restored = Chain::default();
    assert!(matches!(
        from_msgpack(&buffer[..len], &mut restored),
        Err(CodecError::DepthLimitExceeded { limit: 128 })
    ));
}

#[test]
fn test_skipping_deep_unknown_value_is_not_limited() {
    init_tracing();
    let mut bytes = vec![0x82, 0xa4];
    bytes.extend_from_slice(b"name");
    bytes.extend_from_slice(&[0xa3, b'I', b'O', b'7']);
    bytes.extend_from_slice(&[0xa4]);
    bytes.extend_from_slice(b"junk");
    bytes.extend_from_slice(&[0x91; 500]);
    bytes.push(0xc0);

    let mut io = Io::default();
    from_msgpack(&bytes, &mut io).unwrap();
    assert_eq!(io.name, "IO7");
}
