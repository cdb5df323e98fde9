//! AX.25 frame display
//!
//! Basic packet mode carries ordinary AX.25 frames. This module
//! parses just enough of one to print it legibly: the address
//! chain, the control and PID bytes, and the information field as
//! printable text. It is a formatter, not a protocol stack.

use std::fmt;

/// An AX.25 address: callsign, SSID, and the repeated flag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub callsign: String,
    pub ssid: u8,
    pub repeated: bool,
}

impl Address {
    // decode one 7-byte shifted address field
    fn parse(bytes: &[u8]) -> Option<(Address, bool)> {
        if bytes.len() < 7 {
            return None;
        }

        let mut callsign = String::with_capacity(6);
        for &b in &bytes[..6] {
            let c = (b >> 1) as char;
            if c != ' ' {
                callsign.push(c);
            }
        }

        let ssid_byte = bytes[6];
        let address = Address {
            callsign,
            ssid: (ssid_byte >> 1) & 0x0F,
            repeated: ssid_byte & 0x80 != 0,
        };
        let last = ssid_byte & 0x01 != 0;
        Some((address, last))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.callsign, self.ssid)?;
        if self.repeated {
            write!(f, "*")?;
        }
        Ok(())
    }
}

/// A parsed AX.25 frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ax25Frame {
    pub destination: Address,
    pub source: Address,
    pub digipeaters: Vec<Address>,
    pub control: u8,
    pub pid: Option<u8>,
    pub info: Vec<u8>,
}

impl Ax25Frame {
    /// Parse a frame without its trailing checksum
    pub fn parse(bytes: &[u8]) -> Option<Ax25Frame> {
        let (destination, last) = Address::parse(bytes)?;
        if last {
            return None;
        }
        let (source, mut last) = Address::parse(&bytes[7..])?;

        let mut at = 14;
        let mut digipeaters = Vec::new();
        while !last {
            let (digi, l) = Address::parse(&bytes[at..])?;
            digipeaters.push(digi);
            last = l;
            at += 7;
            if digipeaters.len() > 8 {
                return None;
            }
        }

        let control = *bytes.get(at)?;
        at += 1;

        // UI and I frames carry a PID; bit 4 is the poll/final flag
        let has_pid = control & 0xEF == 0x03 || control & 0x01 == 0x00;
        let pid = if has_pid {
            let p = *bytes.get(at)?;
            at += 1;
            Some(p)
        } else {
            None
        };

        Some(Ax25Frame {
            destination,
            source,
            digipeaters,
            control,
            pid,
            info: bytes[at..].to_vec(),
        })
    }

    fn frame_type(&self) -> &'static str {
        match self.control & 0x03 {
            0x03 if self.control & 0xEF == 0x03 => "UI",
            0x03 => "U",
            0x01 => "S",
            _ => "I",
        }
    }
}

impl fmt::Display for Ax25Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)?;
        for digi in &self.digipeaters {
            write!(f, ", via {}", digi)?;
        }
        writeln!(f)?;

        write!(f, "{}, control: {:#04x}", self.frame_type(), self.control)?;
        if let Some(pid) = self.pid {
            write!(f, ", PID: {:#04x}", pid)?;
        }
        writeln!(f)?;

        for &b in &self.info {
            let c = b as char;
            if (' '..='~').contains(&c) || c == '\n' {
                write!(f, "{}", c)?;
            } else {
                write!(f, ".")?;
            }
        }
        Ok(())
    }
}
