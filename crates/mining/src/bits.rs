//! IPv4 literals as bit strings.
//!
//! Addresses are handled as strings of `'0'`/`'1'` so that prefix relations
//! reduce to string prefix operations: `10.0.0.0/8` is `"00001010"`.

/// Prefix length used for entity identity (class C).
pub const SUBNET_BITS: usize = 24;

/// Parse `a.b.c.d` with an optional `/len` suffix into its binary form
/// truncated to `len` bits (32 when absent).
pub fn ipv4_bits(input: &str) -> Option<String> {
    let input = input.trim();
    let (addr, len) = match input.split_once('/') {
        Some((addr, len)) => (addr, len.trim().parse::<usize>().ok()?),
        None => (input, 32),
    };
    if len > 32 {
        return None;
    }

    let mut octets = [0u8; 4];
    let mut parts = addr.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.trim().parse::<u8>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }

    let mut bits = String::with_capacity(32);
    for octet in octets {
        bits.push_str(&format!("{octet:08b}"));
    }
    bits.truncate(len);
    Some(bits)
}

/// Subnet bits of an address (at most the first 24).
pub fn subnet_bits(input: &str) -> Option<String> {
    let mut bits = ipv4_bits(input)?;
    bits.truncate(SUBNET_BITS);
    Some(bits)
}

/// Render a bit prefix back as CIDR text, e.g. `"110000001010100000000001"`
/// becomes `192.168.1.0/24`.
pub fn bits_to_cidr(bits: &str) -> String {
    let mut octets = [0u8; 4];
    for (i, ch) in bits.chars().take(32).enumerate() {
        if ch == '1' {
            octets[i / 8] |= 0x80 >> (i % 8);
        }
    }
    format!(
        "{}.{}.{}.{}/{}",
        octets[0],
        octets[1],
        octets[2],
        octets[3],
        bits.len().min(32)
    )
}

/// Number of leading characters two strings share.
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Longest prefix shared by every string in `items` (empty for no items).
pub fn common_prefix<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut iter = items.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut len = first.len();
    for item in iter {
        len = len.min(common_prefix_len(first, item));
        if len == 0 {
            break;
        }
    }
    while !first.is_char_boundary(len) {
        len -= 1;
    }
    first[..len].to_string()
}
