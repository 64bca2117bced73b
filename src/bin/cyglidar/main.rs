//! Headless CygLidar D1 client. Streams from a device or a recording,
//! optionally mirrors the frames into a file, and logs a summary of the
//! point cloud once a second until Ctrl-C.

use clap::Parser;
use cyglidar::{
    args::{LidarArgs, SourceCommand},
    depth_stats::DepthStats,
    frame_writer::FrameWriter,
    point_cloud_reader::PointCloudReader,
    session,
    transport::SerialPortStream,
    CygLidarD1, LidarError, Mode, Result,
};

use log::{error, info, warn};
use std::{
    io,
    process::ExitCode,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};

const REPORT_PERIOD: Duration = Duration::from_secs(1);

// Example:
// cargo run --bin cyglidar -- --mode 3d device --path /dev/ttyUSB0 --out session.bin
// cargo run --bin cyglidar -- --mode 3d replay --file session.bin
// cargo run --bin cyglidar -- --mode 3d inspect --file session.bin

fn main() -> ExitCode {
    env_logger::init();
    let args = LidarArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("cyglidar: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &LidarArgs) -> Result<()> {
    let mode = args.mode();
    let lidar = match &args.command {
        SourceCommand::Ports => {
            for port in SerialPortStream::available_ports()? {
                println!("{}", port.display());
            }
            return Ok(());
        }
        SourceCommand::Inspect(inspect) => {
            let summary = session::inspect_path(&inspect.file, mode)?;
            println!("{}: {}", inspect.file.display(), summary);
            return Ok(());
        }
        SourceCommand::Device(device) => device.connect(&device.port()?)?,
        SourceCommand::Replay(replay) => replay.connect()?,
    };

    stream(args, lidar, mode)
}

fn stream(args: &LidarArgs, lidar: Arc<CygLidarD1>, mode: Mode) -> Result<()> {
    // Ctrl-C only ever talks to this channel, the lidar is shut down below
    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| LidarError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

    let output = args.open_output()?;

    lidar.run(mode)?;
    let mut reader = PointCloudReader::new(Arc::clone(&lidar));
    reader.start(mode);

    let mut writer = output.map(|output| {
        let mut writer = FrameWriter::new(Arc::clone(&lidar), output, mode);
        writer.start();
        writer
    });

    loop {
        match stop_rx.recv_timeout(REPORT_PERIOD) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("Stop requested");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        report(&lidar, mode);
        if !reader.is_running() {
            warn!("Point cloud reader is {}", reader.status());
            break;
        }
    }

    reader.stop();
    if let Some(writer) = writer.as_mut() {
        writer.stop();
        info!("Frame writer is {}", writer.status());
    }
    lidar.stop()?;
    info!("{} frames decoded", lidar.frames_decoded());
    Ok(())
}

fn report(lidar: &CygLidarD1, mode: Mode) {
    let stats = match mode {
        Mode::Mode3D => lidar.use_3d_point_cloud(|cloud| DepthStats::from_samples(cloud)),
        Mode::Mode2D => lidar.use_2d_point_cloud(|cloud| DepthStats::from_samples(cloud)),
        Mode::Dual => return,
    };
    info!(
        "{} frames decoded{}: {}",
        lidar.frames_decoded(),
        if lidar.read_failed() {
            ", last read failed"
        } else {
            ""
        },
        stats
    );
}
