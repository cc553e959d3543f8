use anyhow::Result;
use pwb::{output, settings, solver};

fn main() -> Result<()> {
    let settings = settings::load_config()?;
    let mut model = settings.build_model()?;

    model.solve()?;

    let conservation = solver::conservation_error(&model)?;
    let worst = conservation.iter().cloned().fold(0.0, f64::max);
    if worst > settings::CONSERVATION_TOL {
        eprintln!("Warning: energy conservation mismatch up to {:.3e}", worst);
    }

    output::writeup(&model, &settings.directory)?;
    println!(
        "Wrote results for '{}' to {}",
        model.name(),
        settings.directory
    );
    Ok(())
}
