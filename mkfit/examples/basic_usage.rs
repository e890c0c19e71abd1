//! Build a FIT from a kernel and DTBs given on the command line, then list
//! what ended up inside it.
//!
//! cargo run --example basic_usage -- Image board-a.dtb board-b.dtb

use mkfit::{FitImageBuilder, FitOptions, FitSummary};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let kernel = args.next().ok_or("usage: basic_usage <kernel> <dtb>...")?;
    let options = FitOptions::new("Linux", "arm64", "linux", kernel).with_dtbs(args);

    let fit = FitImageBuilder::new(options).build()?;
    std::fs::write("image.fit", &fit.data)?;
    println!("Created image.fit: {} bytes", fit.data.len());

    let summary = FitSummary::from_bytes(&fit.data)?;
    println!("{}", summary.description);
    for image in &summary.images {
        println!(
            "  {:<10} {:<14} {:>8} bytes  {}",
            image.name, image.image_type, image.data_size, image.description
        );
    }
    for conf in &summary.configurations {
        println!("  {} -> {} + {}", conf.name, conf.kernel, conf.fdts.join(", "));
    }
    Ok(())
}
