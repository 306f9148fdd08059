pub mod compare;
pub mod db;
pub mod error;
pub mod fields;
pub mod graph;
pub mod model;
pub mod reasoning;
pub mod report;
pub mod routes;

pub use error::{CoreError, Result};
pub use graph::GraphIndex;
pub use model::{Mission, PageGraph};

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
 __        __             __
 \ \      / /_ _ _   _   / _| __ _ _ __ ___ _ __
  \ \ /\ / / _` | | | | | |_ / _` | '__/ _ \ '__|
   \ V  V / (_| | |_| | |  _| (_| | | |  __/ |
    \_/\_/ \__,_|\__, | |_|  \__,_|_|  \___|_|
                 |___/
"#;
    println!("{}", banner.bright_cyan());
    println!(
        "{}",
        "  semantic discovery & graph-driven test execution\n".bright_black()
    );
}
