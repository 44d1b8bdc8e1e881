//! Startup banner

use colored::Colorize;
use oscbridge_router::Bridge;

/// Recognised visualizer control addresses, grouped by section
///
/// The bridge forwards every address unchanged; this list is for operators.
const CONTROL_ADDRESSES: &[(&str, &[(&str, &str)])] = &[
    (
        "FRACTAL TYPE",
        &[
            ("/fractal/type 0-5", "Select fractal"),
            ("/fractal/mandelbrot", "Type 0"),
            ("/fractal/burningship", "Type 1"),
            ("/fractal/multibrot", "Type 2"),
            ("/fractal/newton", "Type 3"),
            ("/fractal/clifford", "Type 4"),
            ("/fractal/domain", "Type 5"),
        ],
    ),
    (
        "NAVIGATION",
        &[
            ("/fractal/centerX float", "Center X"),
            ("/fractal/centerY float", "Center Y"),
            ("/fractal/zoom float", "Zoom (log2)"),
            ("/fractal/reset", "Reset view"),
        ],
    ),
    (
        "COLORS",
        &[
            ("/fractal/colorScheme 0-6", "Palette"),
            ("/fractal/colorOffset 0-1", "Phase"),
            ("/fractal/colorFreq float", "Frequency"),
        ],
    ),
    (
        "JULIA (types 0-2)",
        &[
            ("/fractal/juliaMode 0/1", "Toggle"),
            ("/fractal/juliaX float", "C real"),
            ("/fractal/juliaY float", "C imag"),
        ],
    ),
    (
        "MULTIBROT (type 2)",
        &[("/fractal/power float", "Exponent (2-8)")],
    ),
    (
        "NEWTON (type 3)",
        &[
            ("/fractal/newtonPoly 0-3", "Polynomial"),
            ("/fractal/newtonRelax 0-2", "Relaxation"),
        ],
    ),
    (
        "CLIFFORD (type 4)",
        &[
            ("/fractal/cliffordA float", "Param a"),
            ("/fractal/cliffordB float", "Param b"),
            ("/fractal/cliffordC float", "Param c"),
            ("/fractal/cliffordD float", "Param d"),
        ],
    ),
    (
        "DOMAIN (type 5)",
        &[
            ("/fractal/domainFunc 0-9", "Function"),
            ("/fractal/domainGrid 0/1", "Grid"),
        ],
    ),
    (
        "ANIMATION",
        &[
            ("/fractal/autoZoom 0/1", "Auto-zoom"),
            ("/fractal/colorCycle 0/1", "Color cycle"),
            ("/fractal/animateParams 0/1", "Param animation"),
            ("/fractal/animSpeed float", "Speed (0.1-3)"),
        ],
    ),
    (
        "RENDERING",
        &[("/fractal/maxIter int", "Iterations (50-5000)")],
    ),
];

pub fn print(bridge: &Bridge) {
    println!(
        "{} OSC to WebSocket bridge v{}",
        "OSCBRIDGE".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("  OSC input:   udp://{}", bridge.osc_addr());
    println!("  WebSocket:   ws://{}", bridge.ws_addr());
    println!("  OSC output:  udp://{}", bridge.sender().default_target());
    println!();

    for (section, addresses) in CONTROL_ADDRESSES {
        println!("  {}", section.green().bold());
        for (address, description) in *addresses {
            println!("    {:<30} {}", address.yellow(), description);
        }
    }

    println!();
    println!("  Press Ctrl+C to stop");
}
