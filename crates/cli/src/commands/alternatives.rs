//! `aria alternatives`: Free alternatives to a paid service.

use aria_providers::free_alternatives;

pub async fn run(service: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Free alternatives for \"{service}\":");
    for (i, alt) in free_alternatives(service).iter().enumerate() {
        println!("  {}. {alt}", i + 1);
    }
    Ok(())
}
