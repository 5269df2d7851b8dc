//! Provcom command line interface.

use std::fs;
use std::process;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
};
use console::style;
use log::{debug, trace, LevelFilter};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use simplelog::*;

use provcom::{self as pc, CommandPayload, CurveMaterial, DecisionSource, SessionIo};

fn main() {
    println!("[PC] provcom v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Provcom works in tandem with the device firmware to provision \
            Curve25519 key material over the serial port. It waits for the \
            device to print its UART ready banner, sends a single command \
            line: \n\
               \t  prov curve <scalar-hex> [peer-hex] \n\
            and then watches the device output for the provisioning \
            acknowledgment banner, echoing everything it reads to stdout \
            along the way.\n\
            \n\
            When no acknowledgment shows up in time, provcom offers to \
            resend the same scalar once before giving up. A missing ready \
            banner is only a warning; the device may have booted before the \
            port was opened.\n\
            \n\
            Provcom can be started before or after the device is reset. \
            With --no-wait-ready it skips the banner wait and instead gives \
            the device a fixed settle delay before transmitting.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("SCALAR")
                .help("64-hex Curve25519 scalar to provision")
                .long_help(
                    "64-hex Curve25519 scalar to provision; whitespace is \
                     tolerated and the value is normalized to lowercase. \
                     The material itself is opaque to provcom.",
                )
                .index(1),
        )
        .arg(
            Arg::with_name("PEER")
                .help("optional 64-hex peer public key")
                .index(2),
        )
        .arg(
            Arg::with_name("SCALAR_OPT")
                .help("64-hex Curve25519 scalar (flag form)")
                .long("--scalar")
                .takes_value(true)
                .require_equals(true)
                .conflicts_with("SCALAR"),
        )
        .arg(
            Arg::with_name("PEER_OPT")
                .help("optional 64-hex peer public key (flag form)")
                .long("--peer")
                .takes_value(true)
                .require_equals(true)
                .conflicts_with("PEER"),
        )
        .arg(
            Arg::with_name("DEMO")
                .help("send the built-in RFC 7748 test vectors")
                .long_help(
                    "send the built-in RFC 7748 test vectors; use only for \
                     quick UART validation, real provisioning requires \
                     explicit material.",
                )
                .long("--demo")
                .conflicts_with_all(&["SCALAR", "SCALAR_OPT"]),
        )
        .arg(
            Arg::with_name("COMMAND_FILE")
                .help("send a raw command from this file")
                .long_help(
                    "send a raw command from this file instead of \
                     constructing 'prov curve ...'; the trailing line \
                     terminator is normalized to CRLF.",
                )
                .long("--command-file")
                .takes_value(true)
                .require_equals(true)
                .conflicts_with_all(&["SCALAR", "SCALAR_OPT", "DEMO"]),
        )
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the USB tty device to use")
                .long_help(
                    "the USB tty device to use; may change when the board \
                     is unplugged and re-plugged and may differ between \
                     systems. When not set, provcom offers the list of \
                     detected serial ports for selection.",
                )
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .long_help("serial baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("115200")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_BITS")
                .help("number of bits per character")
                .short("-d")
                .long("--data-bits")
                .takes_value(true)
                .possible_values(&["5", "6", "7", "8"])
                .default_value("8")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STOP_BITS")
                .help("number of stop bits per byte")
                .short("-s")
                .long("--stop-bits")
                .takes_value(true)
                .possible_values(&["1", "2"])
                .default_value("1")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PARITY")
                .help("parity checking protocol")
                .short("-p")
                .long("--parity")
                .takes_value(true)
                .possible_values(&["none", "odd", "even"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FLOW_CONTROL")
                .help("flow control mode")
                .short("-f")
                .long("--flow-control")
                .takes_value(true)
                .possible_values(&["none", "soft", "hard"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("WAIT")
                .help("seconds to wait for the provisioning acknowledgment")
                .long_help(
                    "seconds to wait for the provisioning acknowledgment \
                     after each transmit; set to 0 to skip reading any \
                     response.",
                )
                .long("--wait")
                .takes_value(true)
                .default_value("10.0")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("SEND_DELAY")
                .help("seconds to wait before transmitting")
                .long_help(
                    "seconds to wait before transmitting when --no-wait-ready \
                     is used; helps give the MCU time to reboot/settle before \
                     provisioning.",
                )
                .long("--send-delay")
                .takes_value(true)
                .default_value("7.0")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("NO_READ")
                .help("write the command and exit without draining output")
                .long_help(
                    "write the command and exit without draining UART \
                     output; useful if you want to read the response later \
                     via screen/minicom.",
                )
                .long("--no-read"),
        )
        .arg(
            Arg::with_name("WAIT_READY")
                .help("wait for the device ready banners before provisioning (default)")
                .long("--wait-ready")
                .conflicts_with("NO_WAIT_READY"),
        )
        .arg(
            Arg::with_name("NO_WAIT_READY")
                .help("skip waiting for UART ready banners and use --send-delay instead")
                .long("--no-wait-ready"),
        )
        .arg(
            Arg::with_name("READY_TIMEOUT")
                .help("seconds to wait for the UART ready banners")
                .long("--ready-timeout")
                .takes_value(true)
                .default_value("15.0")
                .require_equals(true),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'provcom -v -v -v' or 'provcom -vvv' vs 'provcom -v'
    let log_level: LevelFilter;
    match matches.occurrences_of("v") {
        0 => log_level = LevelFilter::Warn,
        1 => log_level = LevelFilter::Info,
        2 => log_level = LevelFilter::Debug,
        _ => log_level = LevelFilter::Trace,
    }

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    // It's safe to call unwrap on all command line arguments with default
    // values, because the value with either be what the user input at runtime
    // or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style("baud-rate").cyan()
        );
        println!(
            "   {} `{}` is not a valid value",
            style("-->").cyan(),
            style(matches.value_of("BAUD_RATE").unwrap()).on_red()
        );
        process::exit(-1);
    });

    let data_bits = match matches.value_of("DATA_BITS").unwrap() {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        "8" => DataBits::Eight,
        _ => unreachable!(),
    };

    let stop_bits = match matches.value_of("STOP_BITS").unwrap() {
        "1" => StopBits::One,
        "2" => StopBits::Two,
        _ => unreachable!(),
    };

    let parity = match matches.value_of("PARITY").unwrap() {
        "none" => Parity::None,
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => unreachable!(),
    };

    let flow_control = match matches.value_of("FLOW_CONTROL").unwrap() {
        "none" => FlowControl::None,
        "soft" => FlowControl::Software,
        "hard" => FlowControl::Hardware,
        _ => unreachable!(),
    };

    let ack_wait = seconds_arg(&matches, "WAIT", "wait");
    let send_delay = seconds_arg(&matches, "SEND_DELAY", "send-delay");
    let ready_timeout = seconds_arg(&matches, "READY_TIMEOUT", "ready-timeout");

    // END - Arguments with default values =====================================

    let mut settings = pc::SettingsBuilder::new()
        .baud_rate(baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .wait_ready(!matches.is_present("NO_WAIT_READY"))
        .ready_timeout(ready_timeout)
        .settle_delay(send_delay)
        .ack_timeout(ack_wait)
        .no_read(matches.is_present("NO_READ"))
        .finalize();

    // START - Arguments with NO default values ================================

    if matches.is_present("DEVICE_TTY") {
        settings.path = Some(matches.value_of("DEVICE_TTY").unwrap().into());
    }

    let payload = resolve_payload(&matches);

    // END - Arguments =========================================================

    // Select the port when none was requested explicitly ======================

    while settings.path.is_none() {
        settings.path = pc::select_port();
    }

    // Run the state machine ===================================================

    let link = pc::open_and_setup_port(&settings).unwrap_or_else(|err| {
        println!(
            "{}",
            style("[PC] 💥 Could not open the serial port!").red()
        );
        println!("[PC]    {}", err);
        process::exit(1);
    });

    let decide: Box<dyn DecisionSource> = if console::user_attended() {
        Box::new(pc::ConsoleConfirm)
    } else {
        Box::new(pc::AutoDecline)
    };
    let io = SessionIo::new(Box::new(link), Box::new(std::io::stdout()), decide);

    let ctx = pc::SessionContext::new(settings, payload);
    let report = pc::factory(ctx, io).run();
    debug!("exit code: {}", report.exit_code());
    process::exit(report.exit_code().into());
}

/// Parse a seconds argument with a default value into a `Duration`.
fn seconds_arg(matches: &clap::ArgMatches, name: &str, display: &str) -> std::time::Duration {
    let seconds = value_t!(matches.value_of(name), f64).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style(display).cyan()
        );
        println!(
            "   {} `{}` is not a valid value",
            style("-->").cyan(),
            style(matches.value_of(name).unwrap()).on_red()
        );
        process::exit(-1);
    });
    if seconds < 0.0 {
        println!(
            "{}: `{}` cannot be negative",
            style("error").red(),
            style(display).cyan()
        );
        process::exit(-1);
    }
    std::time::Duration::from_secs_f64(seconds)
}

/// Assemble the command payload from the arguments, rejecting malformed
/// material before any serial port is touched.
fn resolve_payload(matches: &clap::ArgMatches) -> CommandPayload {
    if let Some(path) = matches.value_of("COMMAND_FILE") {
        let blob = fs::read(path).unwrap_or_else(|err| {
            println!(
                "{}: could not read `{}`: {}",
                style("error").red(),
                style(path).cyan(),
                err
            );
            process::exit(-1);
        });
        return CommandPayload::raw(&blob).unwrap_or_else(|err| {
            println!("{}: {}", style("error").red(), err);
            process::exit(-1);
        });
    }

    let material = if matches.is_present("DEMO") {
        eprintln!(
            "{}",
            style(
                "warning: --demo selected; sending RFC 7748 test vectors. \
                 Do not ship hardware provisioned with these values."
            )
            .yellow()
        );
        CurveMaterial::demo()
    } else {
        let scalar = matches
            .value_of("SCALAR")
            .or_else(|| matches.value_of("SCALAR_OPT"))
            .unwrap_or_else(|| {
                println!(
                    "{}: no scalar provided. Pass it as the first argument or \
                     with `{}`, or use `{}` to transmit the RFC 7748 test \
                     vectors.",
                    style("error").red(),
                    style("--scalar").cyan(),
                    style("--demo").cyan()
                );
                process::exit(-1);
            });
        let peer = matches
            .value_of("PEER")
            .or_else(|| matches.value_of("PEER_OPT"));
        CurveMaterial::new(scalar, peer).unwrap_or_else(|err| {
            println!("{}: {}", style("error").red(), err);
            process::exit(-1);
        })
    };

    CommandPayload::curve(&material)
}
