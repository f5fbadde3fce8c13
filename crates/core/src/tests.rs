#[cfg(test)]
mod tests {
    use crate::metrics::TxMetrics;
    use crate::regs::{self, Control};
    use crate::sim::RegisterAccess;
    use crate::{
        PollPolicy, Radix, ReadyModel, SharedUart, SimulatedUart, Termination, TxError, UartTx,
    };
    use std::fmt::Write;
    use std::sync::Arc;

    fn sim_tx(ready: ReadyModel, policy: PollPolicy) -> UartTx<SimulatedUart> {
        UartTx::new(SimulatedUart::with_access_log(ready), policy)
    }

    fn int_to_wire(value: i32, radix: Radix) -> String {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_int(value, radix).unwrap();
        String::from_utf8(tx.into_inner().take_wire()).unwrap()
    }

    #[test]
    fn test_send_byte_handshake_order() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_byte(b'Z').unwrap();

        let ready = Control::READY.bits();
        let ack = Control::ACK.bits();
        assert_eq!(
            tx.registers().log(),
            &[
                RegisterAccess::ReadControl(ready),
                RegisterAccess::WriteData(b'Z' as u32),
                RegisterAccess::ReadControl(ready),
                RegisterAccess::WriteControl(ready | ack),
            ]
        );
        // The device consumes the acknowledgement.
        assert_eq!(tx.registers().control() & ack, 0);
    }

    #[test]
    fn test_every_byte_value_sent_once() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        for byte in 0..=u8::MAX {
            tx.send_byte(byte).unwrap();
        }

        let sim = tx.registers();
        let expected: Vec<u8> = (0..=u8::MAX).collect();
        assert_eq!(sim.wire(), expected.as_slice());
        assert_eq!(sim.acks(), 256);
        assert_eq!(sim.overruns(), 0);
        assert_eq!(sim.protocol_violations(), 0);
        assert!(!sim.has_pending());

        let data_writes = sim
            .log()
            .iter()
            .filter(|a| matches!(a, RegisterAccess::WriteData(_)))
            .count();
        assert_eq!(data_writes, 256);
    }

    #[test]
    fn test_send_line_hi() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_line("hi").unwrap();

        let sim = tx.registers();
        assert_eq!(sim.wire(), &[0x68, 0x69, 0x0D, 0x0A]);

        // Each data write directly follows a status read that saw READY.
        let log = sim.log();
        for (i, access) in log.iter().enumerate() {
            if let RegisterAccess::WriteData(_) = access {
                match log[i - 1] {
                    RegisterAccess::ReadControl(status) => assert!(Control::is_ready(status)),
                    other => panic!("data write preceded by {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_send_raw_appends_nothing() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_raw("hello, world!").unwrap();
        assert_eq!(tx.registers().wire(), b"hello, world!");

        tx.send_raw(b"more").unwrap();
        assert_eq!(tx.registers().wire(), b"hello, world!more");
    }

    #[test]
    fn test_send_string_termination_flag() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_string("a", Termination::CrLf).unwrap();
        tx.send_string("b", Termination::Raw).unwrap();
        tx.send_string("c", Termination::CrLf).unwrap();
        assert_eq!(tx.registers().wire(), b"a\r\nbc\r\n");
    }

    #[test]
    fn test_sentinel_ends_string() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_line(b"ab\0cd").unwrap();
        assert_eq!(tx.registers().wire(), b"ab\r\n");
    }

    #[test]
    fn test_empty_string() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_raw("").unwrap();
        assert!(tx.registers().log().is_empty());
        assert!(tx.registers().wire().is_empty());

        tx.send_line("").unwrap();
        assert_eq!(tx.registers().wire(), b"\r\n");
        assert_eq!(tx.registers().acks(), 2);
    }

    #[test]
    fn test_repeated_send_is_independent() {
        let mut tx = sim_tx(ReadyModel::AfterPolls(3), PollPolicy::Spin);
        tx.send_line("same").unwrap();
        let first = tx.registers_mut().take_wire();
        tx.send_line("same").unwrap();
        let second = tx.registers_mut().take_wire();

        assert_eq!(first, b"same\r\n");
        assert_eq!(first, second);
    }

    #[test]
    fn test_stuck_hardware_times_out() {
        let mut tx = sim_tx(ReadyModel::Never, PollPolicy::Bounded(50));
        let err = tx.send_byte(b'x').unwrap_err();
        assert_eq!(err, TxError::HardwareTimeout { polls: 50 });

        let sim = tx.registers();
        assert_eq!(sim.polls(), 50);
        assert!(sim.wire().is_empty());
        assert!(sim
            .log()
            .iter()
            .all(|a| matches!(a, RegisterAccess::ReadControl(_))));
    }

    #[test]
    fn test_timeout_aborts_string() {
        let mut tx = sim_tx(ReadyModel::Never, PollPolicy::Bounded(5));
        assert!(matches!(
            tx.send_line("abc"),
            Err(TxError::HardwareTimeout { polls: 5 })
        ));
        assert_eq!(tx.registers().polls(), 5);
    }

    #[test]
    fn test_zero_bound_never_polls() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Bounded(0));
        assert_eq!(
            tx.send_byte(b'x'),
            Err(TxError::HardwareTimeout { polls: 0 })
        );
        assert_eq!(tx.registers().polls(), 0);
    }

    #[test]
    fn test_spin_waits_for_slow_hardware() {
        let mut tx = UartTx::spinning(SimulatedUart::new(ReadyModel::AfterPolls(1000)));
        assert_eq!(tx.policy(), PollPolicy::Spin);
        tx.send_byte(b'k').unwrap();

        // 1000 not-ready reads, the read that sees READY, and the handshake read.
        assert_eq!(tx.registers().polls(), 1002);
        assert_eq!(tx.registers().wire(), b"k");
    }

    #[test]
    fn test_bounded_policy_with_slow_hardware() {
        let mut tx = sim_tx(ReadyModel::AfterPolls(10), PollPolicy::Bounded(10));
        assert!(tx.send_byte(b'a').is_err());

        // Ready withdraws only on acknowledge, so the device is ready now.
        tx.set_policy(PollPolicy::Bounded(11));
        tx.send_byte(b'a').unwrap();

        let mut tx = sim_tx(ReadyModel::AfterPolls(10), PollPolicy::Bounded(11));
        tx.send_line("ok").unwrap();
        assert_eq!(tx.registers().wire(), b"ok\r\n");
    }

    #[test]
    fn test_send_int() {
        assert_eq!(int_to_wire(92, Radix::DECIMAL), "92");
        assert_eq!(int_to_wire(0, Radix::DECIMAL), "0");
        assert_eq!(int_to_wire(-255, Radix::HEX), "-ff");
        assert_eq!(int_to_wire(5, Radix::BINARY), "101");
        assert_eq!(int_to_wire(8, Radix::OCTAL), "10");
        assert_eq!(int_to_wire(i32::MIN, Radix::DECIMAL), "-2147483648");
        assert_eq!(int_to_wire(i32::MAX, Radix::HEX), "7fffffff");
        assert_eq!(
            int_to_wire(i32::MIN, Radix::BINARY),
            format!("-1{}", "0".repeat(31))
        );
    }

    #[test]
    fn test_radix_bounds() {
        assert!(Radix::new(1).is_none());
        assert!(Radix::new(17).is_none());
        assert_eq!(Radix::new(2), Some(Radix::BINARY));
        assert_eq!(Radix::new(16).map(Radix::get), Some(16));
    }

    #[test]
    fn test_fmt_write() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        write!(tx, "{}+{}={}", 2, 2, 4).unwrap();
        assert_eq!(tx.registers().wire(), b"2+2=4");

        let mut stuck = sim_tx(ReadyModel::Never, PollPolicy::Bounded(1));
        assert!(write!(stuck, "x").is_err());
    }

    #[test]
    fn test_fmt_write_sends_embedded_nul() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        write!(tx, "{}{}", "a\0b", "c").unwrap();
        assert_eq!(tx.registers().wire(), b"a\0bc");
    }

    #[test]
    fn test_access_log_is_opt_in() {
        let mut tx = UartTx::spinning(SimulatedUart::new(ReadyModel::AfterPolls(100_000)));
        tx.send_byte(b'a').unwrap();
        assert!(tx.registers().log().is_empty());
        assert_eq!(tx.registers().polls(), 100_002);
        assert_eq!(tx.registers().wire(), b"a");
    }

    #[test]
    fn test_clear_access_log() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_byte(b'a').unwrap();
        assert_eq!(tx.registers().log().len(), 4);

        tx.registers_mut().clear_log();
        assert!(tx.registers().log().is_empty());
        tx.send_byte(b'b').unwrap();
        assert_eq!(tx.registers().log().len(), 4);
        assert_eq!(tx.registers().wire(), b"ab");
    }

    #[test]
    fn test_metrics_observer() {
        let metrics = Arc::new(TxMetrics::new());
        let mut tx = sim_tx(ReadyModel::AfterPolls(2), PollPolicy::Spin);
        tx.add_observer(metrics.clone());

        tx.send_raw("ab").unwrap();
        assert_eq!(metrics.get_bytes(), 2);
        assert_eq!(metrics.get_polls(), 6);
        assert_eq!(metrics.get_timeouts(), 0);

        tx.registers_mut().set_ready_model(ReadyModel::Never);
        tx.set_policy(PollPolicy::Bounded(4));
        assert!(tx.send_byte(b'c').is_err());
        assert_eq!(metrics.get_polls(), 10);
        assert_eq!(metrics.get_timeouts(), 1);

        metrics.reset();
        assert_eq!(metrics.get_bytes(), 0);
    }

    #[test]
    fn test_shared_uart_lines_do_not_interleave() {
        let shared = SharedUart::new(sim_tx(ReadyModel::AfterPolls(1), PollPolicy::Spin));

        let handles: Vec<_> = (b'a'..b'e')
            .map(|tag| {
                let uart = shared.clone();
                std::thread::spawn(move || {
                    let line = vec![tag; 16];
                    for _ in 0..20 {
                        uart.send_line(&line).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let wire = shared.with(|tx| tx.registers().wire().to_vec());
        let text = String::from_utf8(wire).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 80);
        for line in lines {
            assert_eq!(line.len(), 16);
            let first = line.as_bytes()[0];
            assert!(line.bytes().all(|b| b == first), "interleaved: {line:?}");
        }
    }

    #[test]
    fn test_shared_uart_operations() {
        let shared = SharedUart::new(sim_tx(ReadyModel::Always, PollPolicy::Spin));
        shared.send_raw("n=").unwrap();
        shared.send_int(-42, Radix::DECIMAL).unwrap();
        shared.send_byte(b';').unwrap();
        shared.send_string("end", Termination::CrLf).unwrap();

        let wire = shared.with(|tx| tx.registers().wire().to_vec());
        assert_eq!(wire, b"n=-42;end\r\n");
    }

    #[test]
    fn test_sim_ready_bit_is_hardware_owned() {
        let mut sim = SimulatedUart::new(ReadyModel::Never);
        sim.write_reg(regs::CONTROL, Control::READY.bits());
        assert_eq!(sim.read_reg(regs::CONTROL) & Control::READY.bits(), 0);

        let mut sim = SimulatedUart::new(ReadyModel::Always);
        sim.write_reg(regs::CONTROL, 0);
        assert!(Control::is_ready(sim.read_reg(regs::CONTROL)));
    }

    #[test]
    fn test_sim_protocol_faults() {
        let mut sim = SimulatedUart::new(ReadyModel::Always);
        sim.write_reg(regs::CONTROL, Control::ACK.bits());
        assert_eq!(sim.protocol_violations(), 1);
        assert!(sim.wire().is_empty());

        sim.write_reg(regs::TX_DATA, b'1' as u32);
        sim.write_reg(regs::TX_DATA, b'2' as u32);
        assert_eq!(sim.overruns(), 1);
        sim.write_reg(regs::CONTROL, Control::ACK.bits());
        assert_eq!(sim.wire(), b"2");

        let mut stuck = SimulatedUart::new(ReadyModel::Never);
        stuck.write_reg(regs::TX_DATA, 0);
        assert_eq!(stuck.protocol_violations(), 1);

        assert_eq!(sim.read_reg(regs::TX_DATA), 0);
        assert_eq!(sim.read_reg(0x40), 0);
    }

    #[test]
    fn test_snapshot_json() {
        let mut tx = sim_tx(ReadyModel::Always, PollPolicy::Spin);
        tx.send_line("hi").unwrap();

        let snapshot = tx.registers().snapshot();
        assert_eq!(snapshot.wire_text, "hi\r\n");
        assert_eq!(snapshot.acks, 4);

        let json = snapshot.to_json().unwrap();
        assert_eq!(json["wire_text"], "hi\r\n");
        assert_eq!(json["ready_model"], "always");
        assert_eq!(json["pending"], false);
    }
}
