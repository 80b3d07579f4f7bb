//! Random-art fingerprints of public keys.
//!
//! Uses the "drunken bishop" walk popularised by OpenSSH: every pair of bits
//! of the key moves a bishop diagonally over a 17x9 board, and each cell is
//! rendered by how often it was visited. Two keys that differ anywhere look
//! visibly different, which makes the art handy for eyeballing keys.

const WIDTH: usize = 17;
const HEIGHT: usize = 9;
const SYMBOLS: &[u8] = b" .o+=*BOX@%&#/^SE";
const START: u8 = (SYMBOLS.len() - 2) as u8;
const END: u8 = (SYMBOLS.len() - 1) as u8;

/// Renders the fingerprint of `bytes`, framed, one board row per line.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut field = [[0u8; WIDTH]; HEIGHT];
    let (mut x, mut y) = (WIDTH / 2, HEIGHT / 2);
    let (start_x, start_y) = (x, y);

    for byte in bytes {
        let mut bits = *byte;
        for _ in 0..4 {
            x = if bits & 0x1 != 0 {
                (x + 1).min(WIDTH - 1)
            } else {
                x.saturating_sub(1)
            };
            y = if bits & 0x2 != 0 {
                (y + 1).min(HEIGHT - 1)
            } else {
                y.saturating_sub(1)
            };
            // the two top symbols are reserved for the start and end markers
            if field[y][x] < START - 1 {
                field[y][x] += 1;
            }
            bits >>= 2;
        }
    }
    field[start_y][start_x] = START;
    field[y][x] = END;

    let border = format!("+{}+", "-".repeat(WIDTH));
    let mut out = String::with_capacity((WIDTH + 3) * (HEIGHT + 2));
    out.push_str(&border);
    out.push('\n');
    for row in field.iter() {
        out.push('|');
        out.extend(row.iter().map(|cell| SYMBOLS[*cell as usize] as char));
        out.push_str("|\n");
    }
    out.push_str(&border);
    out
}
