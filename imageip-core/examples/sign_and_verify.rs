//! Example signing an image with a throwaway key store and verifying it.
//!
//! Run with: cargo run -p imageip-core --example sign_and_verify [IMAGE]
//!
//! Without an argument a small generated PNG is used.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageip_core::{
    decode_image, Attribution, EmbeddedFields, ImageClass, KeyAuthority, KeyStoreAuthority,
    KeyStoreConfig, License, PixelBuffer, SignerVerifier,
};
use tracing_subscriber::{fmt, EnvFilter};

fn sample_png() -> Vec<u8> {
    let mut img = RgbImage::new(32, 32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x * 8) as u8, (y * 8) as u8, 128]);
    }
    let mut buffer = Cursor::new(Vec::new());
    if let Err(e) = DynamicImage::ImageRgb8(img).write_to(&mut buffer, ImageFormat::Png) {
        eprintln!("Failed to encode sample image: {}", e);
    }
    buffer.into_inner()
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("imageip_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== ImageIP Sign & Verify Demo ===\n");

    let bytes = match std::env::args().nth(1) {
        Some(path) => match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Failed to read {}: {}", path, e);
                return;
            }
        },
        None => sample_png(),
    };

    let image = match decode_image(&bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let attribution = Attribution::new("Alice", "Alice Ltd", License::CcBy, 2024);
    if ImageClass::of(&image) == ImageClass::HasAlpha {
        println!("Image has transparency; tag the file instead:");
        println!("   {}", attribution.filesystem_label());
        return;
    }

    let store_dir = match tempfile::TempDir::new() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to create key store: {}", e);
            return;
        }
    };
    let authority = Arc::new(KeyStoreAuthority::new(KeyStoreConfig::new(store_dir.path())));
    let key = match authority.generate("alice@example.com") {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Failed to generate key: {}", e);
            return;
        }
    };
    println!("Key: {}\n", key);

    let signer = SignerVerifier::new(authority);
    let pixels = match PixelBuffer::from_image(&image) {
        Ok(pixels) => pixels,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let text = match signer.sign_pixels(&pixels, &attribution, &key) {
        Ok(text) => text,
        Err(e) => {
            println!("\n❌ Signing failed: {}", e);
            return;
        }
    };
    let fields = EmbeddedFields::new(&attribution, &text);
    println!("\n✅ Signed");
    println!("   Artist:     {}", fields.artist);
    println!("   Copyright:  {}", fields.copyright);
    println!("   Signature:  {}...", &text[..text.len().min(48)]);

    match signer.verify_embedded(&pixels, &fields, &key) {
        Ok(result) => println!("\nUntouched image: {}", result),
        Err(e) => println!("\n❌ Verification failed: {}", e),
    }

    let mut tampered = pixels.clone();
    if let Some(first) = tampered.pixel(0, 0).map(<[u8]>::to_vec) {
        let flipped: Vec<u8> = first.iter().map(|c| c ^ 0xFF).collect();
        let _ = tampered.set_pixel(0, 0, &flipped);
    }
    match signer.verify_embedded(&tampered, &fields, &key) {
        Ok(result) => println!("One pixel changed: {}", result),
        Err(e) => println!("❌ Verification failed: {}", e),
    }
}
