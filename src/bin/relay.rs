use std::process::exit;

fn usage() -> ! {
    eprintln!("usage: relay <bind-addr> <server-addr> [loss-rate] [delay-ms] [seed]");
    exit(2);
}

fn parse<T: std::str::FromStr>(arg: &str) -> T {
    arg.parse().unwrap_or_else(|_| usage())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 || args.len() > 6 {
        usage();
    }

    let bind_addr = &args[1];
    let server_addr = &args[2];

    let mut config = tamarack::netsim::Config::default();
    if let Some(arg) = args.get(3) {
        config.loss_rate = parse(arg);
    }
    if let Some(arg) = args.get(4) {
        config.delay_ms = parse(arg);
    }
    if let Some(arg) = args.get(5) {
        config.seed = parse(arg);
    }

    let mut relay = match tamarack::netsim::Relay::bind(bind_addr, server_addr, config) {
        Ok(relay) => relay,
        Err(err) => {
            eprintln!("failed to bind {}: {}", bind_addr, err);
            exit(1);
        }
    };

    println!("relaying {} -> {}", relay.local_addr(), server_addr);

    loop {
        if let Err(err) = relay.step() {
            eprintln!("relay error: {}", err);
            exit(1);
        }
    }
}
