/// Maps a host pin to the external interrupt it can raise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqLine {
    pub pin: u8,
    pub interrupt: u8,
}
impl IrqLine {
    pub const fn new(pin: u8, interrupt: u8) -> Self {
        Self { pin, interrupt }
    }
}

/// ATmega168/328 based boards.
pub const ATMEGA328_IRQ_LINES: &[IrqLine] = &[IrqLine::new(2, 0), IrqLine::new(3, 1)];
/// ATmega1280/2560 based boards.
pub const ATMEGA2560_IRQ_LINES: &[IrqLine] = &[
    IrqLine::new(2, 0),
    IrqLine::new(3, 1),
    IrqLine::new(21, 2),
    IrqLine::new(20, 3),
    IrqLine::new(19, 4),
    IrqLine::new(18, 5),
];
/// ATmega32u4 based boards.
pub const ATMEGA32U4_IRQ_LINES: &[IrqLine] = &[
    IrqLine::new(7, 4),
    IrqLine::new(3, 0),
    IrqLine::new(2, 1),
    IrqLine::new(0, 2),
    IrqLine::new(1, 3),
];

/// Configuration for bringing up the chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// The host pin the chip's interrupt line is wired to.
    pub irq_pin: u8,
    /// The interrupt capable pins of the host.
    pub irq_lines: &'static [IrqLine],
    /// Which patches the chip should load on start.
    ///
    /// Zero means the ones stored on the chip.
    pub patch_request: u8,
}
impl Config {
    pub const fn new(irq_pin: u8) -> Self {
        Self {
            irq_pin,
            irq_lines: ATMEGA328_IRQ_LINES,
            patch_request: 0,
        }
    }
    pub const fn with_irq_lines(mut self, irq_lines: &'static [IrqLine]) -> Self {
        self.irq_lines = irq_lines;
        self
    }
    pub const fn with_patch_request(mut self, patch_request: u8) -> Self {
        self.patch_request = patch_request;
        self
    }
    /// Look up the interrupt of the configured pin.
    ///
    /// If a pin is listed more than once, the last entry wins.
    pub fn resolve_interrupt(&self) -> Option<u8> {
        self.irq_lines
            .iter()
            .rev()
            .find(|line| line.pin == self.irq_pin)
            .map(|line| line.interrupt)
    }
}
