//! Parallel batch reads, one connection per worker

mod common;

use ceserver_client::config::Config;
use ceserver_client::memory::{BatchRead, BatchReader, PointerChain};
use ceserver_client::{Address, MemoryValue, ValueType};
use common::{MockServer, MockState};
use pretty_assertions::assert_eq;

fn state() -> MockState {
    let mut state = MockState::new().process(42, "target");
    for i in 0..32u64 {
        state = state.bytes(0x10000 + i * 4, &(i as u32 * 3).to_le_bytes());
    }
    state.pointer(0x20000, 0x30000).bytes(0x30010, &7i16.to_le_bytes())
}

#[test]
fn test_batch_preserves_order() {
    let server = MockServer::start(state());
    let requests: Vec<_> = (0..32u64)
        .map(|i| BatchRead::direct(Address::new(0x10000 + i * 4), ValueType::U32))
        .collect();

    let values = BatchReader::new(server.options(), 42)
        .with_workers(4)
        .read_all(&requests)
        .unwrap();

    let expected: Vec<_> = (0..32u32).map(|i| Some(MemoryValue::U32(i * 3))).collect();
    assert_eq!(values, expected);

    let state = server.state.lock().unwrap();
    assert_eq!(state.connections, 4);
    assert_eq!(state.closed.len(), 4);
}

#[test]
fn test_batch_mixes_chains_and_misses() {
    let server = MockServer::start(state());
    let requests = vec![
        BatchRead::Chain {
            chain: PointerChain::new(Address::new(0x20000), vec![0]),
            final_offset: 0x10,
            value_type: ValueType::I16,
        },
        BatchRead::direct(Address::new(0xdead0000), ValueType::U64),
    ];

    let values = BatchReader::new(server.options(), 42)
        .with_workers(8)
        .read_all(&requests)
        .unwrap();
    assert_eq!(values, vec![Some(MemoryValue::I16(7)), None]);
}

#[test]
fn test_batch_unopenable_process() {
    let server = MockServer::start(state().refuse(42));
    let requests = vec![BatchRead::direct(Address::new(0x10000), ValueType::U32); 3];

    let values = BatchReader::new(server.options(), 42)
        .with_workers(2)
        .read_all(&requests)
        .unwrap();
    assert_eq!(values, vec![None, None, None]);
}

#[test]
fn test_empty_batch_connects_nowhere() {
    let server = MockServer::start(state());
    let values = BatchReader::new(server.options(), 42).read_all(&[]).unwrap();
    assert!(values.is_empty());
    assert_eq!(server.state.lock().unwrap().connections, 0);
}

#[test]
fn test_batch_reader_from_config_uses_configured_workers() {
    let server = MockServer::start(state());
    let mut config = Config::default();
    config.server.port = server.port;
    config.client.workers = 3;

    let reader = BatchReader::from_config(&config, 42);
    assert_eq!(reader.workers(), 3);

    let requests: Vec<_> = (0..12u64)
        .map(|i| BatchRead::direct(Address::new(0x10000 + i * 4), ValueType::U32))
        .collect();
    let values = reader.read_all(&requests).unwrap();
    assert_eq!(values[11], Some(MemoryValue::U32(33)));
    assert_eq!(server.state.lock().unwrap().connections, 3);
}
