//! Polling driver for 16550-compatible UARTs.
//!
//! The driver performs single-byte, volatile accesses to the memory-mapped
//! register block at the base address. There is no buffering and no
//! interrupt handling; [`Uart::put`] and the [`fmt::Write`] implementation
//! spin on the line status register.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use core::{fmt, ptr};

use bitflags::bitflags;

/// Baud rate divisor programmed by [`Uart::open`].
pub const DEFAULT_DIVISOR: u16 = 592;

/// Number of byte registers in the register block.
pub const REGISTER_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Register {
    offset: usize,
}

// the UART control registers.
// some have different meanings for
// read vs write.
// see <http://byterunner.com/16550.html>

impl Register {
    /// Receive Holding Register (readonly)
    const RX_HOLDING: Self = Self::new(0);
    /// Transmit Holding Register (writeonly)
    const TX_HOLDING: Self = Self::new(0);
    /// Interrupt Enable Register (writeonly)
    const INTERRUPT_ENABLE: Self = Self::new(1);
    /// FIFO Control Register (writeonly)
    const FIFO_CONTROL: Self = Self::new(2);
    /// Line Control Register (writeonly)
    const LINE_CONTROL: Self = Self::new(3);
    /// Line Status Register (readonly)
    const LINE_STATUS: Self = Self::new(5);

    /// LSB of Divisor Latch
    const DIVISOR_LATCH_LSB: Self = Self::new(0);
    /// MSB of Divisor Latch
    const DIVISOR_LATCH_MSB: Self = Self::new(1);

    const fn new(offset: usize) -> Self {
        Self { offset }
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct InterruptEnable : u8 {
        const RX_READY = 1 << 0;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct FifoControl : u8 {
        const FIFO_ENABLE = 1 << 0;
        const RX_FIFO_RESET = 1 << 1;
        const TX_FIFO_RESET = 1 << 2;
        const FIFO_RESET = Self::RX_FIFO_RESET.bits() | Self::TX_FIFO_RESET.bits();
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LineControl : u8 {
        const EIGHT_BITS = 0b11;
        const BAUD_LATCH = 1 << 7;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LineStatus : u8 {
        const RX_READY = 1 << 0;
        const TX_IDLE = 1 << 5;
    }
}

/// Handle to an initialized UART.
#[derive(Debug)]
pub struct Uart {
    base_addr: usize,
}

impl Uart {
    /// Programs the UART at `base_addr` for 8 data bits, no parity, one stop
    /// bit, with FIFOs enabled and the [`DEFAULT_DIVISOR`].
    ///
    /// # Safety
    ///
    /// `base_addr..base_addr + REGISTER_COUNT` must be the register block of
    /// a 16550-compatible UART (or memory standing in for it) that nothing
    /// else accesses while the handle is alive.
    #[must_use]
    pub unsafe fn open(base_addr: usize) -> Self {
        unsafe { Self::open_with_divisor(base_addr, DEFAULT_DIVISOR) }
    }

    /// Like [`open`](Self::open), but latches `divisor` as the baud rate
    /// divisor.
    ///
    /// # Safety
    ///
    /// Same as [`open`](Self::open).
    #[must_use]
    pub unsafe fn open_with_divisor(base_addr: usize, divisor: u16) -> Self {
        let mut uart = Self { base_addr };
        let line_control = LineControl::EIGHT_BITS;

        // word length 8 bits, no parity
        uart.write_register(Register::LINE_CONTROL, line_control.bits());
        // reset and enable FIFOs
        uart.write_register(
            Register::FIFO_CONTROL,
            (FifoControl::FIFO_ENABLE | FifoControl::FIFO_RESET).bits(),
        );
        // enable receive interrupts
        uart.write_register(
            Register::INTERRUPT_ENABLE,
            InterruptEnable::RX_READY.bits(),
        );

        // special mode to set baud rate
        uart.write_register(
            Register::LINE_CONTROL,
            (line_control | LineControl::BAUD_LATCH).bits(),
        );
        let [divisor_msb, divisor_lsb] = divisor.to_be_bytes();
        uart.write_register(Register::DIVISOR_LATCH_LSB, divisor_lsb);
        uart.write_register(Register::DIVISOR_LATCH_MSB, divisor_msb);

        // leave set-baud mode
        uart.write_register(Register::LINE_CONTROL, line_control.bits());

        uart
    }

    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base_addr
    }

    fn register_addr(&self, offset: usize) -> usize {
        assert!(
            offset < REGISTER_COUNT,
            "register offset out of range: {offset}"
        );
        self.base_addr + offset
    }

    fn write_register(&mut self, reg: Register, value: u8) {
        self.write_byte(reg.offset, value);
    }

    fn read_register(&mut self, reg: Register) -> u8 {
        self.read_byte(reg.offset)
    }

    /// Reads the register at `offset` from the base address.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not below [`REGISTER_COUNT`].
    pub fn read_byte(&mut self, offset: usize) -> u8 {
        let addr = self.register_addr(offset);
        unsafe { ptr::with_exposed_provenance::<u8>(addr).read_volatile() }
    }

    /// Writes `value` to the register at `offset` from the base address.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not below [`REGISTER_COUNT`].
    pub fn write_byte(&mut self, offset: usize, value: u8) {
        let addr = self.register_addr(offset);
        unsafe {
            ptr::with_exposed_provenance_mut::<u8>(addr).write_volatile(value);
        }
    }

    pub fn is_tx_idle(&mut self) -> bool {
        LineStatus::from_bits_retain(self.read_register(Register::LINE_STATUS))
            .contains(LineStatus::TX_IDLE)
    }

    pub fn is_rx_ready(&mut self) -> bool {
        LineStatus::from_bits_retain(self.read_register(Register::LINE_STATUS))
            .contains(LineStatus::RX_READY)
    }

    /// Returns the next received byte, if one is waiting.
    pub fn try_read(&mut self) -> Option<u8> {
        self.is_rx_ready()
            .then(|| self.read_register(Register::RX_HOLDING))
    }

    /// Waits until the transmitter is idle, then sends `byte`.
    pub fn put(&mut self, byte: u8) {
        while !self.is_tx_idle() {
            core::hint::spin_loop();
        }
        self.write_register(Register::TX_HOLDING, byte);
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.put(b'\r');
            }
            self.put(byte);
        }
        Ok(())
    }
}
