//! Seed the catalog with persons.
//!
//! Usage: `seed_catalog "Full Name" ["Full Name" ...]`

use dispogen::db::CatalogDb;

fn main() {
    env_logger::init();

    let names: Vec<String> = std::env::args().skip(1).collect();
    if names.is_empty() {
        eprintln!("usage: seed_catalog \"Full Name\" [\"Full Name\" ...]");
        std::process::exit(2);
    }

    let db = match CatalogDb::open() {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open catalog: {e}");
            std::process::exit(1);
        }
    };

    for name in &names {
        match db.insert_person(name) {
            Ok(person) => println!("{} -> id {}", person.full_name, person.id),
            Err(e) => {
                eprintln!("Failed to insert {name}: {e}");
                std::process::exit(1);
            }
        }
    }
    println!("Seeded {} person(s).", names.len());
}
