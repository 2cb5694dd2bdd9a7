//! Plume Profile Example
//!
//! Prints a downwind concentration profile for a single constant source
//! under each atmospheric stability class.

use nalgebra::{Point3, Vector3};
use plumesim_physics::{
    BoundaryPolicy, DispersionConfig, DispersionEngine, EmissionPattern, FieldBounds,
    MaterialProperties, SourceKind, SourceModel, SpatialField, StabilityClass,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("╔══════════════════════════════════════╗");
    println!("║     PlumeSim Downwind Profile        ║");
    println!("╚══════════════════════════════════════╝\n");

    let bounds = FieldBounds::new(
        Point3::new(-200.0, -200.0, 0.0),
        Point3::new(200.0, 200.0, 50.0),
    )?;
    let mut field = SpatialField::new(bounds, BoundaryPolicy::Clamp);
    field.set_airflow(Vector3::new(1.0, 0.0, 0.0));

    let source = SourceModel::new(
        "stack",
        SourceKind::chemical("co"),
        Point3::new(0.0, 0.0, 2.0),
        EmissionPattern::Constant { rate: 100.0 },
        MaterialProperties::default(),
    )?;
    field.install_source(source)?;

    println!("100 µg/s CO source at 2 m, wind 1 m/s along +x, receptor at 1.5 m\n");
    println!("x (m)   | A        | D        | F");
    println!("--------|----------|----------|----------");

    let classes = [StabilityClass::A, StabilityClass::D, StabilityClass::F];
    let engines: Vec<DispersionEngine> = classes
        .iter()
        .map(|&stability| {
            DispersionEngine::new(DispersionConfig {
                stability,
                ..Default::default()
            })
        })
        .collect::<Result<_, _>>()?;

    for x in [2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 150.0] {
        let point = Point3::new(x, 0.0, 1.5);
        print!("{x:>7.0} |");
        for engine in &engines {
            let c = engine.concentration_at(&field.view(), point, 0.0)?;
            print!(" {c:>8.3} |");
        }
        println!();
    }

    println!("\nValues in µg/m³.");
    Ok(())
}
