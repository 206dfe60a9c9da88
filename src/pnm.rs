use std::io::{Read, Write};

use anyhow::{Context, Result};

use crate::error::PmoExitCode;
use crate::helpers::err_exit_code;
use crate::here;
use crate::structs::image::Image;

/// Reads a binary (P5) grayscale PGM image. Whitespace and `#`-prefixed
/// comments between header tokens are skipped per the NetPBM format;
/// only an 8-bit (`maxval <= 255`) single-channel image is supported.
pub fn read_pgm<R: Read>(mut reader: R) -> Result<Image<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context(here!())?;

    let mut pos = 0usize;
    let magic = read_token(&buf, &mut pos).context(here!())?;
    if magic != "P5" {
        return err_exit_code(PmoExitCode::InvalidInput, "not a binary (P5) PGM file");
    }

    let width: i32 = read_token(&buf, &mut pos)
        .context(here!())?
        .parse()
        .context(here!())?;
    let height: i32 = read_token(&buf, &mut pos)
        .context(here!())?
        .parse()
        .context(here!())?;
    let maxval: u32 = read_token(&buf, &mut pos)
        .context(here!())?
        .parse()
        .context(here!())?;

    if width <= 0 || height <= 0 {
        return err_exit_code(PmoExitCode::InvalidInput, "PGM has non-positive dimensions");
    }
    if maxval == 0 || maxval > 255 {
        return err_exit_code(PmoExitCode::InvalidInput, "only 8-bit PGM (maxval <= 255) is supported");
    }

    // exactly one whitespace byte separates the header from raw pixel data
    pos += 1;

    let expected = (width as usize) * (height as usize);
    if buf.len() < pos + expected {
        return err_exit_code(PmoExitCode::InvalidInput, "PGM pixel data is truncated");
    }

    let data = buf[pos..pos + expected].to_vec();
    Ok(Image::from_vec(width, height, data))
}

/// Writes `image` as a binary (P5) grayscale PGM file.
pub fn write_pgm<W: Write>(mut writer: W, image: &Image<u8>) -> Result<()> {
    write!(writer, "P5\n{} {}\n255\n", image.width(), image.height()).context(here!())?;
    writer.write_all(image.as_slice()).context(here!())?;
    Ok(())
}

/// Reads the next whitespace-delimited token, skipping `#`-to-end-of-line
/// comments, starting from `*pos`. Advances `*pos` past the token.
fn read_token(buf: &[u8], pos: &mut usize) -> Result<String> {
    loop {
        while *pos < buf.len() && (buf[*pos] as char).is_whitespace() {
            *pos += 1;
        }
        if *pos < buf.len() && buf[*pos] == b'#' {
            while *pos < buf.len() && buf[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }

    let start = *pos;
    while *pos < buf.len() && !(buf[*pos] as char).is_whitespace() {
        *pos += 1;
    }
    if start == *pos {
        return err_exit_code(PmoExitCode::InvalidInput, "PGM header ended unexpectedly");
    }
    Ok(String::from_utf8_lossy(&buf[start..*pos]).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let image = Image::from_vec(3, 2, vec![10, 20, 30, 40, 50, 60]);
        let mut bytes = Vec::new();
        write_pgm(&mut bytes, &image).unwrap();

        let decoded = read_pgm(&bytes[..]).unwrap();
        assert_eq!(decoded.as_slice(), image.as_slice());
        assert_eq!(decoded.width(), 3);
        assert_eq!(decoded.height(), 2);
    }

    #[test]
    fn test_rejects_non_p5() {
        let bytes = b"P2\n1 1\n255\n0";
        assert!(read_pgm(&bytes[..]).is_err());
    }

    #[test]
    fn test_skips_comment_line() {
        let bytes = b"P5\n# a comment\n2 1\n255\n\x01\x02";
        let decoded = read_pgm(&bytes[..]).unwrap();
        assert_eq!(decoded.as_slice(), &[1, 2]);
    }
}
