//! recon-hardware
//!
//! Hardware crate that contains the frame codec, the HID and serial drivers,
//! and the device polling state machine for the Recon fan controller.
//
//! Public API:
//! - `device::Device` — lifecycle, polling workers and operator setters
//! - `hid_driver::HidDriver` — USB HID driver for the stock controller
//! - `serial_driver::SerialDriver` — low-level serial I/O driver
//! - `serial_driver::find_controller` — helper to locate the device by VID/PID
//! - `transport::FrameTransport` — seam for mock transports in tests

pub mod channel;
pub mod device;
pub mod frame;
pub mod hid_driver;
pub mod protocol;
pub mod serial_driver;
pub mod transport;

pub use channel::Channel;
pub use device::Device;
pub use frame::{Frame, FRAME_SIZE};
pub use hid_driver::HidDriver;
pub use serial_driver::{find_controller, SerialDriver};
pub use transport::FrameTransport;
