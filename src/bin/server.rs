use std::process::exit;

fn usage() -> ! {
    eprintln!("usage: server <bind-addr> <file> [fast-recovery 0|1] [congestion 0|1]");
    exit(2);
}

fn parse_flag(arg: Option<&String>) -> bool {
    match arg.map(|s| s.as_str()) {
        None | Some("1") => true,
        Some("0") => false,
        Some(_) => usage(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 || args.len() > 5 {
        usage();
    }

    let bind_addr = &args[1];
    let file_path = &args[2];

    let mut config = tamarack::server::Config::default();
    config.session.fast_retransmit = parse_flag(args.get(3));
    config.session.congestion_control = parse_flag(args.get(4));

    let mut server = match tamarack::Server::bind_with_config(bind_addr, config) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("failed to bind {}: {}", bind_addr, err);
            exit(1);
        }
    };

    println!("server listening on {}", server.local_addr());

    loop {
        let mut file = match std::fs::File::open(file_path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("failed to open {}: {}", file_path, err);
                exit(1);
            }
        };

        match server.serve(&mut file) {
            Ok(summary) => {
                println!(
                    "sent {} bytes to {} ({} segments, {} timeout retransmits, \
                     {} fast retransmits, {} EOF attempts)",
                    summary.bytes_sent,
                    summary.peer,
                    summary.segments_sent,
                    summary.retransmits_timeout,
                    summary.retransmits_fast,
                    summary.eof_attempts,
                );
            }
            Err(err) => {
                eprintln!("transfer failed: {}", err);
            }
        }
    }
}
