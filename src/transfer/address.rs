//! Data connection address formats
//!
//! PORT/PASV use the comma-separated `h1,h2,h3,h4,p1,p2` form; EPRT/EPSV use
//! the delimited `|proto|addr|port|` form from RFC 2428.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::ProtocolError;
use crate::protocol::{Reply, codes};

fn malformed(arg: &str) -> ProtocolError {
    ProtocolError::MalformedArgument(arg.to_string())
}

/// Parses a PORT argument such as `192,168,1,2,4,1`.
pub fn parse_port_argument(arg: &str) -> Result<SocketAddr, ProtocolError> {
    let parts = arg
        .trim()
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed(arg))?;

    let [h1, h2, h3, h4, p1, p2] = parts[..] else {
        return Err(malformed(arg));
    };
    let port = u16::from_be_bytes([p1, p2]);
    if port == 0 {
        return Err(malformed(arg));
    }
    Ok(SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::new(h1, h2, h3, h4),
        port,
    )))
}

/// Parses an EPRT argument such as `|1|132.235.1.2|6275|` or `|2|::1|6275|`.
pub fn parse_eprt_argument(arg: &str) -> Result<SocketAddr, ProtocolError> {
    let arg = arg.trim();
    let delimiter = arg.chars().next().ok_or_else(|| malformed(arg))?;
    if !(33..=126).contains(&(delimiter as u32)) {
        return Err(malformed(arg));
    }

    let fields: Vec<&str> = arg.split(delimiter).collect();
    let ["", proto, address, port, ""] = fields[..] else {
        return Err(malformed(arg));
    };

    let ip: IpAddr = match proto {
        "1" => IpAddr::V4(address.parse().map_err(|_| malformed(arg))?),
        "2" => IpAddr::V6(address.parse().map_err(|_| malformed(arg))?),
        _ => return Err(malformed(arg)),
    };
    let port: u16 = port.parse().map_err(|_| malformed(arg))?;
    if port == 0 {
        return Err(malformed(arg));
    }
    Ok(SocketAddr::new(ip, port))
}

/// Builds the 227 reply announcing a passive endpoint.
pub fn pasv_reply(ip: Ipv4Addr, port: u16) -> Reply {
    let [h1, h2, h3, h4] = ip.octets();
    let [p1, p2] = port.to_be_bytes();
    Reply::new(
        codes::ENTERING_PASSIVE,
        format!(
            "Entering Passive Mode ({},{},{},{},{},{}).",
            h1, h2, h3, h4, p1, p2
        ),
    )
}

/// Builds the 229 reply announcing an extended passive port.
pub fn epsv_reply(port: u16) -> Reply {
    Reply::new(
        codes::ENTERING_EXTENDED_PASSIVE,
        format!("Entering Extended Passive Mode (|||{}|).", port),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_argument() {
        let addr = parse_port_argument("127,0,0,1,4,1").unwrap();
        assert_eq!(addr, "127.0.0.1:1025".parse().unwrap());

        assert!(parse_port_argument("127,0,0,1,4").is_err());
        assert!(parse_port_argument("127,0,0,1,4,256").is_err());
        assert!(parse_port_argument("127,0,0,1,0,0").is_err());
        assert!(parse_port_argument("a,b,c,d,e,f").is_err());
    }

    #[test]
    fn test_parse_eprt_argument() {
        assert_eq!(
            parse_eprt_argument("|1|132.235.1.2|6275|").unwrap(),
            "132.235.1.2:6275".parse().unwrap()
        );
        assert_eq!(
            parse_eprt_argument("!2!::1!2121!").unwrap(),
            "[::1]:2121".parse().unwrap()
        );

        assert!(parse_eprt_argument("|3|1.2.3.4|21|").is_err());
        assert!(parse_eprt_argument("|1|::1|21|").is_err());
        assert!(parse_eprt_argument("|1|1.2.3.4|21").is_err());
        assert!(parse_eprt_argument("").is_err());
    }

    #[test]
    fn test_passive_replies() {
        let reply = pasv_reply(Ipv4Addr::new(10, 0, 0, 7), 2122);
        assert_eq!(reply.code(), 227);
        assert_eq!(reply.message(), "Entering Passive Mode (10,0,0,7,8,74).");

        let reply = epsv_reply(2122);
        assert_eq!(reply.code(), 229);
        assert_eq!(reply.message(), "Entering Extended Passive Mode (|||2122|).");
    }
}
