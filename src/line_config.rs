//! Puts a POSIX serial line into raw 8-N-1 mode without flow control.
//!
//! Rates with a standard `Bxxxx` constant go through `cfsetispeed` /
//! `cfsetospeed`. Anything else (the D1 defaults to 250000 baud) goes through
//! the Linux `termios2` ioctls with `BOTHER`, after which the applied speeds
//! are read back and compared: a silently rounded rate would make every frame
//! header check fail later on.

use crate::error::{LidarError, Result};

use log::{debug, info};
use std::io;
use std::os::unix::io::RawFd;

/// Access to a terminal's attributes, split out so the configuration logic
/// can run against something other than a real tty.
pub trait LineControl {
    /// `tcgetattr`
    fn get_attrs(&self) -> io::Result<libc::termios>;
    /// `tcsetattr(TCSANOW)`
    fn set_attrs(&self, attrs: &libc::termios) -> io::Result<()>;
    /// `ioctl(TCGETS2)`
    fn get_attrs2(&self) -> io::Result<libc::termios2>;
    /// `ioctl(TCSETS2)`
    fn set_attrs2(&self, attrs: &libc::termios2) -> io::Result<()>;
}

/// A borrowed tty file descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Tty(pub RawFd);

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl LineControl for Tty {
    fn get_attrs(&self) -> io::Result<libc::termios> {
        // SAFETY: termios is plain old data, all zeroes is a valid value
        let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: the pointer is valid for the duration of the call
        check(unsafe { libc::tcgetattr(self.0, &mut attrs) })?;
        Ok(attrs)
    }

    fn set_attrs(&self, attrs: &libc::termios) -> io::Result<()> {
        // SAFETY: the pointer is valid for the duration of the call
        check(unsafe { libc::tcsetattr(self.0, libc::TCSANOW, attrs) })
    }

    fn get_attrs2(&self) -> io::Result<libc::termios2> {
        // SAFETY: termios2 is plain old data, all zeroes is a valid value
        let mut attrs: libc::termios2 = unsafe { std::mem::zeroed() };
        // SAFETY: TCGETS2 writes exactly one termios2 through the pointer
        check(unsafe {
            libc::ioctl(self.0, libc::TCGETS2, &mut attrs as *mut libc::termios2)
        })?;
        Ok(attrs)
    }

    fn set_attrs2(&self, attrs: &libc::termios2) -> io::Result<()> {
        // SAFETY: TCSETS2 only reads one termios2 through the pointer
        check(unsafe {
            libc::ioctl(self.0, libc::TCSETS2, attrs as *const libc::termios2)
        })
    }
}

/// The `Bxxxx` constant for `baud_rate`, if there is one.
pub fn standard_speed(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        500_000 => libc::B500000,
        576_000 => libc::B576000,
        921_600 => libc::B921600,
        1_000_000 => libc::B1000000,
        1_152_000 => libc::B1152000,
        1_500_000 => libc::B1500000,
        2_000_000 => libc::B2000000,
        2_500_000 => libc::B2500000,
        3_000_000 => libc::B3000000,
        3_500_000 => libc::B3500000,
        4_000_000 => libc::B4000000,
        _ => return None,
    };
    Some(speed)
}

/// Raw mode, 8 data bits, no parity, one stop bit, no flow control, reads
/// return whatever is available.
pub fn make_raw(attrs: &mut libc::termios) {
    attrs.c_cflag |= libc::CREAD | libc::CLOCAL;
    attrs.c_cflag &= !libc::CSIZE;
    attrs.c_cflag |= libc::CS8;
    attrs.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CRTSCTS);

    attrs.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);

    attrs.c_lflag &= !(libc::ICANON
        | libc::IEXTEN
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHOKE
        | libc::ECHOCTL
        | libc::ISIG);
    attrs.c_oflag &= !(libc::OPOST | libc::ONLCR);

    attrs.c_cc[libc::VMIN] = 0;
    attrs.c_cc[libc::VTIME] = 0;
}

/// Configure `line` for raw 8-N-1 traffic at `baud_rate`.
pub fn configure<L: LineControl + ?Sized>(line: &L, baud_rate: u32) -> Result<()> {
    let mut attrs = line.get_attrs()?;
    make_raw(&mut attrs);

    let standard = standard_speed(baud_rate);
    if let Some(speed) = standard {
        // SAFETY: both calls only touch the termios we own
        check(unsafe { libc::cfsetispeed(&mut attrs, speed) })?;
        check(unsafe { libc::cfsetospeed(&mut attrs, speed) })?;
    }
    line.set_attrs(&attrs)?;

    match standard {
        Some(_) => info!("Serial line configured at {} baud", baud_rate),
        None => set_custom_baud_rate(line, baud_rate)?,
    }
    Ok(())
}

/// Apply an arbitrary integer baud rate through `termios2` and verify the
/// driver kept it.
pub fn set_custom_baud_rate<L: LineControl + ?Sized>(line: &L, baud_rate: u32) -> Result<()> {
    let mut attrs = line.get_attrs2()?;
    attrs.c_cflag &= !libc::CBAUD;
    attrs.c_cflag |= libc::BOTHER;
    attrs.c_ispeed = baud_rate;
    attrs.c_ospeed = baud_rate;
    line.set_attrs2(&attrs)?;

    let applied = line.get_attrs2()?;
    debug!(
        "Custom baud rate {} read back as in {}, out {}",
        baud_rate, applied.c_ispeed, applied.c_ospeed
    );
    if applied.c_ispeed != baud_rate || applied.c_ospeed != baud_rate {
        return Err(LidarError::BaudRateMismatch {
            requested: baud_rate,
            input: applied.c_ispeed,
            output: applied.c_ospeed,
        });
    }

    info!("Serial line configured at custom {} baud", baud_rate);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// A pretend tty. `skew` is added to every custom speed it is handed,
    /// the way a driver rounding to its nearest divisor would.
    struct FakeLine {
        attrs: RefCell<libc::termios>,
        attrs2: RefCell<libc::termios2>,
        skew: u32,
        calls: RefCell<Vec<&'static str>>,
    }

    impl FakeLine {
        fn new(skew: u32) -> Self {
            // SAFETY: both structs are plain old data
            let (attrs, attrs2) = unsafe { (std::mem::zeroed(), std::mem::zeroed()) };
            Self {
                attrs: RefCell::new(attrs),
                attrs2: RefCell::new(attrs2),
                skew,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl LineControl for FakeLine {
        fn get_attrs(&self) -> io::Result<libc::termios> {
            self.calls.borrow_mut().push("get");
            Ok(*self.attrs.borrow())
        }

        fn set_attrs(&self, attrs: &libc::termios) -> io::Result<()> {
            self.calls.borrow_mut().push("set");
            *self.attrs.borrow_mut() = *attrs;
            Ok(())
        }

        fn get_attrs2(&self) -> io::Result<libc::termios2> {
            self.calls.borrow_mut().push("get2");
            Ok(*self.attrs2.borrow())
        }

        fn set_attrs2(&self, attrs: &libc::termios2) -> io::Result<()> {
            self.calls.borrow_mut().push("set2");
            let mut applied = *attrs;
            applied.c_ispeed += self.skew;
            applied.c_ospeed += self.skew;
            *self.attrs2.borrow_mut() = applied;
            Ok(())
        }
    }

    #[test]
    fn standard_rate_uses_the_plain_speed_calls() {
        let line = FakeLine::new(0);
        configure(&line, 115_200).unwrap();

        let attrs = *line.attrs.borrow();
        // SAFETY: reading speeds from a termios we own
        let (ispeed, ospeed) = unsafe { (libc::cfgetispeed(&attrs), libc::cfgetospeed(&attrs)) };
        assert_eq!(ispeed, libc::B115200);
        assert_eq!(ospeed, libc::B115200);
        assert_eq!(*line.calls.borrow(), vec!["get", "set"]);
    }

    #[test]
    fn custom_rate_goes_through_termios2() {
        let line = FakeLine::new(0);
        configure(&line, 250_000).unwrap();

        let attrs2 = *line.attrs2.borrow();
        assert_eq!(attrs2.c_ispeed, 250_000);
        assert_eq!(attrs2.c_ospeed, 250_000);
        assert_eq!(attrs2.c_cflag & libc::BOTHER, libc::BOTHER);
        assert_eq!(*line.calls.borrow(), vec!["get", "set", "get2", "set2", "get2"]);
    }

    #[test]
    fn custom_rate_the_driver_refuses_is_a_mismatch() {
        let line = FakeLine::new(400);
        match configure(&line, 250_000) {
            Err(LidarError::BaudRateMismatch {
                requested,
                input,
                output,
            }) => {
                assert_eq!(requested, 250_000);
                assert_eq!(input, 250_400);
                assert_eq!(output, 250_400);
            }
            other => panic!("expected a baud rate mismatch, got {other:?}"),
        }
        // the readback is the last thing that touched the line
        assert_eq!(line.calls.borrow().last(), Some(&"get2"));
    }

    #[test]
    fn raw_mode_is_eight_n_one_without_flow_control() {
        // SAFETY: plain old data
        let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
        attrs.c_cflag = libc::PARENB | libc::CSTOPB | libc::CRTSCTS | libc::CS7;
        attrs.c_lflag = libc::ICANON | libc::ECHO;
        attrs.c_iflag = libc::IXON | libc::ICRNL;

        make_raw(&mut attrs);

        assert_eq!(attrs.c_cflag & libc::CSIZE, libc::CS8);
        assert_eq!(attrs.c_cflag & (libc::PARENB | libc::CSTOPB | libc::CRTSCTS), 0);
        assert_ne!(attrs.c_cflag & libc::CREAD, 0);
        assert_eq!(attrs.c_lflag & (libc::ICANON | libc::ECHO), 0);
        assert_eq!(attrs.c_iflag & (libc::IXON | libc::ICRNL), 0);
        assert_eq!(attrs.c_cc[libc::VMIN], 0);
    }

    #[test]
    fn non_standard_rates_have_no_constant() {
        assert_eq!(standard_speed(250_000), None);
        assert_eq!(standard_speed(57_600), Some(libc::B57600));
        assert_eq!(standard_speed(3_000_000), Some(libc::B3000000));
    }
}
