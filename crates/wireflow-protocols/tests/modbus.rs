#![cfg(feature = "modbus")]

mod common;

use std::time::Duration;

use common::{connection_config, transport, Device, ModbusServer};
use proptest::prelude::*;
use tokio::io::DuplexStream;
use tokio_test::assert_ok;
use wireflow_codec::{Message, Parse};
use wireflow_core::types::{ResponseCode, Value};
use wireflow_engine::{Connection, RequestOptions};
use wireflow_protocols::modbus::{
    ExceptionCode, FunctionCode, ModbusPdu, ModbusTag, ModbusTcpAdu, ModbusTcpDriver,
};

async fn open(io: DuplexStream, driver: ModbusTcpDriver) -> Connection<ModbusTcpDriver> {
    assert_ok!(Connection::open(driver, io, connection_config(Duration::from_secs(5))).await)
}

fn tag(address: &str) -> ModbusTag {
    address.parse().expect("tag parses")
}

fn registers_reply(request: &ModbusTcpAdu, registers: Vec<u16>) -> ModbusTcpAdu {
    ModbusTcpAdu::new(
        request.transaction_id,
        request.unit_id,
        ModbusPdu::ReadRegistersResponse {
            function: FunctionCode::ReadHoldingRegisters,
            registers,
        },
    )
}

/// Answer `count` register reads, last received first, with the start address in every register
async fn answer_in_reverse(device: &mut Device<ModbusServer>, count: usize) {
    let mut requests = Vec::new();
    for _ in 0..count {
        requests.push(device.recv().await);
    }
    for request in requests.iter().rev() {
        let reply = match request.pdu {
            ModbusPdu::ReadRequest {
                starting_address,
                quantity,
                ..
            } => registers_reply(request, vec![starting_address; usize::from(quantity)]),
            ref other => panic!("unexpected request {:?}", other),
        };
        device.send(&reply).await;
    }
}

#[test_log::test(tokio::test)]
async fn test_read_real_from_holding_registers() {
    let (io, mut device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::new(3)).await;
    let real = tag("holding-register:1:REAL");

    let device_side = async {
        let request = device.recv().await;
        assert_eq!(request.unit_id, 3);
        assert_eq!(
            request.pdu,
            ModbusPdu::ReadRequest {
                function: FunctionCode::ReadHoldingRegisters,
                starting_address: 0,
                quantity: 2,
            }
        );
        device.send(&registers_reply(&request, vec![0x3FC0, 0x0000])).await;
    };
    let read_tags = [real.clone()];
    let (response, _) = tokio::join!(connection.read(&read_tags, RequestOptions::new()), device_side);

    assert!(response.all_ok());
    assert_eq!(response.value(&real), Some(&Value::Float(1.5)));
}

#[test_log::test(tokio::test)]
async fn test_pipelined_answers_in_any_order() {
    let (io, mut device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::default()).await;
    let tags = [
        tag("holding-register:11"),
        tag("holding-register:21"),
        tag("holding-register:31"),
    ];

    let (response, _) = tokio::join!(
        connection.read(&tags, RequestOptions::new()),
        answer_in_reverse(&mut device, 3)
    );

    assert!(response.all_ok());
    assert_eq!(response.value(&tags[0]), Some(&Value::Integer(10)));
    assert_eq!(response.value(&tags[1]), Some(&Value::Integer(20)));
    assert_eq!(response.value(&tags[2]), Some(&Value::Integer(30)));
}

#[test_log::test(tokio::test)]
async fn test_exception_fails_only_its_tag() {
    let (io, mut device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::default().with_sequential_dispatch()).await;
    let good = tag("holding-register:1");
    let missing = tag("holding-register:9000");

    let device_side = async {
        for _ in 0..2 {
            let request = device.recv().await;
            let reply = match request.pdu {
                ModbusPdu::ReadRequest {
                    starting_address: 0,
                    ..
                } => registers_reply(&request, vec![42]),
                _ => ModbusTcpAdu::new(
                    request.transaction_id,
                    request.unit_id,
                    ModbusPdu::Exception {
                        function: 0x03,
                        code: ExceptionCode::from(0x02u8),
                    },
                ),
            };
            device.send(&reply).await;
        }
    };
    let read_tags = [good.clone(), missing.clone()];
    let (response, _) = tokio::join!(
        connection.read(&read_tags, RequestOptions::new()),
        device_side
    );

    assert_eq!(response.get(&good).map(|item| item.code), Some(ResponseCode::Ok));
    assert_eq!(response.value(&good), Some(&Value::Integer(42)));
    assert_eq!(
        response.get(&missing).map(|item| item.code),
        Some(ResponseCode::InvalidAddress)
    );
}

#[test_log::test(tokio::test)]
async fn test_write_coil_is_acknowledged_by_echo() {
    let (io, mut device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::default()).await;
    let coil = tag("coil:8");

    let device_side = async {
        let request = device.recv().await;
        assert_eq!(
            request.pdu,
            ModbusPdu::WriteSingleCoil {
                address: 7,
                value: true
            }
        );
        device.send(&request).await;
    };
    let write_tags = [coil.clone()];
    let (response, _) = tokio::join!(
        connection.write(&write_tags, &[Value::Bool(true)], RequestOptions::new()),
        device_side
    );

    assert!(response.all_ok());
}

#[test_log::test(tokio::test)]
async fn test_resynchronizes_after_line_noise() {
    let (io, mut device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::default()).await;
    let register = tag("input-register:5");

    let device_side = async {
        let request = device.recv().await;
        let reply = ModbusTcpAdu::new(
            request.transaction_id,
            request.unit_id,
            ModbusPdu::ReadRegistersResponse {
                function: FunctionCode::ReadInputRegisters,
                registers: vec![7],
            },
        );
        let mut bytes = vec![0xFF, 0x13, 0x37];
        bytes.extend(reply.to_bytes().expect("reply encodes"));
        device.send_raw(&bytes).await;
    };
    let read_tags = [register.clone()];
    let (response, _) = tokio::join!(
        connection.read(&read_tags, RequestOptions::new()),
        device_side
    );

    assert_eq!(response.value(&register), Some(&Value::Integer(7)));
    assert_eq!(connection.framing_stats().bytes_discarded, 3);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_silent_device_times_out() {
    let (io, mut device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::default()).await;
    let register = tag("holding-register:1");
    let options = RequestOptions::new().with_timeout(Duration::from_millis(100));

    let read_tags = [register.clone()];
    let (response, _) = tokio::join!(connection.read(&read_tags, options), device.recv());

    assert_eq!(
        response.get(&register).map(|item| item.code),
        Some(ResponseCode::Timeout)
    );
}

#[test_log::test(tokio::test)]
async fn test_subscriptions_are_unsupported() {
    let (io, _device) = transport(ModbusServer);
    let connection = open(io, ModbusTcpDriver::default()).await;
    let register = tag("holding-register:1");

    let subscription = connection
        .subscribe(&[register], |_| {}, RequestOptions::new())
        .await;

    assert_eq!(
        subscription.response.get(&register).map(|item| item.code),
        Some(ResponseCode::Unsupported)
    );
}

proptest! {
    #[test]
    fn register_responses_survive_the_wire(
        transaction_id in any::<u16>(),
        unit_id in any::<u8>(),
        registers in prop::collection::vec(any::<u16>(), 1..=125),
    ) {
        let adu = ModbusTcpAdu::new(
            transaction_id,
            unit_id,
            ModbusPdu::ReadRegistersResponse {
                function: FunctionCode::ReadHoldingRegisters,
                registers,
            },
        );
        let bytes = adu.to_bytes().unwrap();
        prop_assert_eq!(bytes.len() * 8, adu.length_in_bits());
        prop_assert_eq!(ModbusTcpAdu::from_bytes(&bytes, true).unwrap(), adu);
    }

    #[test]
    fn coil_writes_survive_the_wire(
        starting_address in any::<u16>(),
        values in prop::collection::vec(any::<bool>(), 1..=1968),
    ) {
        let adu = ModbusTcpAdu::new(
            1,
            1,
            ModbusPdu::WriteMultipleCoilsRequest { starting_address, values },
        );
        let bytes = adu.to_bytes().unwrap();
        prop_assert_eq!(bytes.len() * 8, adu.length_in_bits());
        prop_assert_eq!(ModbusTcpAdu::from_bytes(&bytes, false).unwrap(), adu);
    }
}
