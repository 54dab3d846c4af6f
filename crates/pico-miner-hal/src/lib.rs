#![no_std]

/// Signal lines between the microcontroller and the hash pipelines.
///
/// Every method drives or samples exactly one line. Implementations must not
/// add edges of their own: the pipelines count strobe transitions, so the
/// order and number of calls made by the controller is the wire protocol.
pub trait PipelineBus {
    /// Sample the 8-bit read bus (the byte the pipelines currently present).
    fn read_data(&mut self) -> u8;

    /// Drive the read strobe. Every level change advances the pipelines'
    /// output cursor by one byte.
    fn set_read_strobe(&mut self, high: bool);

    /// Drive the write-start line. A high-then-low pulse makes the pipelines
    /// snapshot their result slots and rewind the output cursor.
    fn set_write_start(&mut self, high: bool);

    /// Place a byte on the 8-bit write bus.
    fn write_data(&mut self, byte: u8);

    /// Invert the write strobe. Each transition shifts the byte on the write
    /// bus into the pipelines while the load line is asserted.
    fn toggle_write_strobe(&mut self);

    /// Drive the load line. Asserted for the duration of a work upload.
    fn set_load(&mut self, high: bool);

    /// Drive the hold line. While high the pipeline clock is gated and the
    /// pipelines are held in reset.
    fn set_hold(&mut self, high: bool);

    /// Drive the result latch used by boards that stream results straight
    /// from the pipelines instead of buffering them.
    fn set_latch(&mut self, high: bool);
}

/// Programming lines of the external clock generator.
///
/// The generator samples PROGDATA on the rising edge of PROGCLK while PROGEN
/// is high; there is no acknowledgement.
pub trait ClockGenLines {
    /// Drive PROGEN.
    fn set_prog_enable(&mut self, high: bool);

    /// Drive PROGCLK.
    fn set_prog_clock(&mut self, high: bool);

    /// Drive PROGDATA.
    fn set_prog_data(&mut self, high: bool);
}

/// Optional front-panel indicator for the stopped state.
pub trait StatusIndicator {
    fn show_stopped(&mut self, stopped: bool);
}

/// Boards without an indicator use `()`.
impl StatusIndicator for () {
    fn show_stopped(&mut self, _stopped: bool) {}
}
