//! Hardware seams.
//!
//! The engine itself is pure logic; this module is the only place that
//! touches `embedded-hal`. The platform implements [`InputPort`] for its two
//! input ports and [`TxUart`] for the output UART, wires the configuration
//! pin as an `InputPin`, and calls [`Board::step`] once per scheduler column
//! from its timing source.

use embedded_hal::digital::InputPin;

use crate::mux::Multiplexer;
use crate::sample::PortPins;

/// One 8-bit parallel input port.
pub trait InputPort {
    /// Read the current pin levels. Called exactly once per column; the
    /// sampler depends on evenly spaced reads.
    fn read(&mut self) -> u8;
}

/// The output UART's transmit side.
pub trait TxUart {
    /// Whether the transmit register can accept a byte.
    fn ready(&mut self) -> bool;

    /// Write one byte. Only called after `ready` returned true this column.
    fn write(&mut self, byte: u8);
}

/// The board's I/O bundle.
pub struct Board<A, B, P, U> {
    pub port_a: A,
    pub port_b: B,
    pub config_pin: P,
    pub uart: U,
}

impl<A, B, P, U> Board<A, B, P, U>
where
    A: InputPort,
    B: InputPort,
    P: InputPin,
    U: TxUart,
{
    /// Run one engine column against the hardware. Returns `true` when the
    /// configuration pin was sampled asserted; the caller then runs the
    /// dialogue and re-initialises the engine.
    pub fn step(&mut self, mux: &mut Multiplexer, now_us: i64) -> bool {
        let pins = PortPins {
            port_a: self.port_a.read(),
            port_b: self.port_b.read(),
        };
        let config_low = self.config_pin.is_low().unwrap_or(false);
        let ready = self.uart.ready();
        let out = mux.tick(now_us, pins, config_low, ready);
        if let Some(byte) = out.tx {
            self.uart.write(byte);
        }
        out.enter_config
    }
}
