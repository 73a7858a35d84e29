//! IPv4 address validation and conversion to and from `sockaddr_in`.

use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::{Error, Result};

/// Parses a strict IPv4 dotted-quad (`a.b.c.d`, each octet `0..=255`).
///
/// # Errors
///
/// Returns [Error::InvalidAddress] for anything else, including shorthand
/// forms such as `127.1` and hostnames.
pub fn parse_ipv4(addr: &str) -> Result<Ipv4Addr> {
    addr.parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidAddress(addr.to_string()))
}

/// Builds an `AF_INET` socket address in network byte order.
pub fn to_sockaddr_in(ip: Ipv4Addr, port: u16) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = port.to_be();
    sa.sin_addr.s_addr = u32::from_ne_bytes(ip.octets());
    sa
}

/// Reads the address and port out of a `sockaddr_in`.
pub fn from_sockaddr_in(sa: &libc::sockaddr_in) -> SocketAddrV4 {
    let ip = Ipv4Addr::from(sa.sin_addr.s_addr.to_ne_bytes());
    SocketAddrV4::new(ip, u16::from_be(sa.sin_port))
}

/// Size of `sockaddr_in` as expected by the socket syscalls.
pub(crate) const SOCKADDR_IN_LEN: libc::socklen_t =
    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn dotted_quad_accepted(a: u8, b: u8, c: u8, d: u8) {
            let text = format!("{a}.{b}.{c}.{d}");
            prop_assert_eq!(parse_ipv4(&text).unwrap(), Ipv4Addr::new(a, b, c, d));
        }

        #[test]
        fn octet_out_of_range_rejected(a in 256u32..100_000, b: u8, c: u8, d: u8) {
            let text = format!("{a}.{b}.{c}.{d}");
            prop_assert!(matches!(parse_ipv4(&text), Err(Error::InvalidAddress(_))));
        }

        #[test]
        fn non_numeric_rejected(text in "[a-zA-Z:/ ]{1,20}") {
            prop_assert!(matches!(parse_ipv4(&text), Err(Error::InvalidAddress(_))));
        }
    }

    #[test]
    fn malformed_addresses_rejected() {
        for addr in [
            "",
            "345.001.002.003",
            "1.2.3",
            "1.2.3.4.5",
            "127.1",
            "localhost",
            "1.2.3.-4",
            "::1",
            " 127.0.0.1",
        ] {
            match parse_ipv4(addr) {
                Err(Error::InvalidAddress(a)) => assert_eq!(a, addr),
                other => panic!("{addr:?} unexpectedly parsed: {other:?}"),
            }
        }
    }

    #[test]
    fn sockaddr_conversion() {
        let sa = to_sockaddr_in(Ipv4Addr::new(127, 0, 0, 1), 56743);
        assert_eq!(sa.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(u16::from_be(sa.sin_port), 56743);
        assert_eq!(sa.sin_addr.s_addr.to_ne_bytes(), [127, 0, 0, 1]);

        let back = from_sockaddr_in(&sa);
        assert_eq!(back, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 56743));
    }
}
