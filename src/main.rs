use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;

use anyhow::{Context, Result};
use log::info;

use pmo_codec::config::Config;
use pmo_codec::error::exit_code_of;
use pmo_codec::structs::codec::{decode, encode};
use pmo_codec::{here, pnm};

fn run() -> Result<()> {
    simple_logger::SimpleLogger::new().init().ok();

    let raw_args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();
    let config = Config::parse(raw_args).context(here!())?;
    config.validate().context(here!())?;

    if !config.is_encoder() && !config.is_decoder() {
        anyhow::bail!(
            "nothing to do: pass -i/-b to encode or -b/-o to decode (see -h equivalent flags in README)"
        );
    }

    if config.is_encoder() {
        let input_path = config.path_input_image.as_ref().unwrap();
        let bitstream_path = config.path_bitstream.as_ref().unwrap();

        let file = File::open(input_path).context(here!())?;
        let image = pnm::read_pgm(file).context(here!())?;

        info!("encoding {:?} ({}x{})", input_path, image.width(), image.height());
        let bytes = encode(&image, &config).context(here!())?;

        std::fs::write(bitstream_path, &bytes).context(here!())?;
        info!("wrote {} bytes to {:?}", bytes.len(), bitstream_path);
    }

    if config.is_decoder() {
        let bitstream_path = config.path_bitstream.as_ref().unwrap();
        let output_path = config.path_output_image.as_ref().unwrap();

        let bytes = std::fs::read(bitstream_path).context(here!())?;
        info!("decoding {:?} ({} bytes)", bitstream_path, bytes.len());
        let image = decode(&bytes, &config).context(here!())?;

        let file = File::create(output_path).context(here!())?;
        pnm::write_pgm(BufWriter::new(file), &image).context(here!())?;
        info!("wrote {}x{} image to {:?}", image.width(), image.height(), output_path);
    }

    // round-trip self-test: when both an input image and an output image
    // path are given, encode then decode then byte-compare.
    if let (Some(input_path), Some(output_path)) = (&config.path_input_image, &config.path_output_image) {
        if config.is_encoder() && config.is_decoder() {
            let original = pnm::read_pgm(File::open(input_path).context(here!())?).context(here!())?;
            let roundtripped = pnm::read_pgm(File::open(output_path).context(here!())?).context(here!())?;

            if original.as_slice() == roundtripped.as_slice()
                && original.width() == roundtripped.width()
                && original.height() == roundtripped.height()
            {
                info!("Successful lossless compression.");
            } else {
                anyhow::bail!("Sorry. Lossless compression failed.");
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:?}", err);
            ExitCode::from(exit_code_of(&err).as_process_code() as u8)
        }
    }
}
