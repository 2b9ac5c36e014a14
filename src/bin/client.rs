use std::io::BufWriter;
use std::process::exit;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 3 {
        eprintln!("usage: client <server-addr> <output-file>");
        exit(2);
    }

    let server_addr = &args[1];
    let output_path = &args[2];

    let mut client = match tamarack::Client::connect(server_addr) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("failed to reach {}: {}", server_addr, err);
            exit(1);
        }
    };

    let file = match std::fs::File::create(output_path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to create {}: {}", output_path, err);
            exit(1);
        }
    };

    match client.download(&mut BufWriter::new(file)) {
        Ok(summary) => {
            println!(
                "downloaded {} bytes ({} segments, {} buffered out of order, \
                 {} duplicates dropped)",
                summary.bytes_written,
                summary.segments_received,
                summary.out_of_order_buffered,
                summary.duplicates_dropped,
            );
        }
        Err(err) => {
            eprintln!("download failed: {}", err);
            exit(1);
        }
    }
}
