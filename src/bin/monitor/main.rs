mod gui;

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use cyglidar::{
    args::{LidarArgs, SourceCommand},
    frame_writer::FrameWriter,
    gui::{device_selector, LidarGuiError},
    point_cloud_reader::PointCloudReader,
    transport::SerialPortStream,
};
use gui::engage_gui;

fn main() -> ExitCode {
    env_logger::init();
    let args = LidarArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("monitor: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &LidarArgs) -> Result<(), LidarGuiError> {
    let mode = args.mode();
    let lidar = match &args.command {
        SourceCommand::Device(device) => {
            let path = match &device.path {
                Some(path) => path.clone(),
                None => match device_selector(SerialPortStream::available_ports()?, device.serial_baud)? {
                    Some(path) => path,
                    None => return Ok(()),
                },
            };
            device.connect(&path)?
        }
        SourceCommand::Replay(replay) => replay.connect()?,
        SourceCommand::Inspect(_) | SourceCommand::Ports => {
            eprintln!("monitor only streams; use the cyglidar binary to inspect or list ports");
            return Ok(());
        }
    };

    let output = args.open_output()?;

    lidar.run(mode)?;
    let mut reader = PointCloudReader::new(Arc::clone(&lidar));
    reader.start(mode);
    let mut writer = output.map(|output| {
        let mut writer = FrameWriter::new(Arc::clone(&lidar), output, mode);
        writer.start();
        writer
    });

    let res = engage_gui(&lidar, mode, &reader, writer.as_ref());

    reader.stop();
    if let Some(writer) = writer.as_mut() {
        writer.stop();
    }
    lidar.stop()?;

    res
}
