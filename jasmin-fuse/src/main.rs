mod block_file;
mod cli;

use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use jasmin::{
    blocks_needed, check_address, validate_filename, FileKind, FileMeta, FileType, Geometry,
    JasminFileSystem, VolumeMeta, SECTOR_SIZE,
};
use typed_bytesize::ByteSizeIec;

pub use self::{
    block_file::BlockFile,
    cli::{Cli, Command},
};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    log::info!("image={:?}", cli.image);

    if let Command::Format { sides, label } = &cli.command {
        return format(&cli.image, *sides, label);
    }

    let fd = OpenOptions::new().read(true).write(true).open(&cli.image)?;
    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd, SECTOR_SIZE)?);
    let fs = JasminFileSystem::mount(block_dev)?;
    run(&fs, cli.command)
}

fn format(image: &Path, sides: u8, label: &str) -> Result<(), Box<dyn Error>> {
    let geometry = Geometry::from_sides(sides).ok_or("sides must be 1 or 2")?;
    let disk_size = (geometry.block_count() * SECTOR_SIZE) as u64;

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(disk_size)?;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd, SECTOR_SIZE)?);
    let fs = JasminFileSystem::format(block_dev, &VolumeMeta::labelled(label))?;
    let meta = fs.metadata()?;
    println!(
        "{}: {} sided, {}, label {:?}",
        image.display(),
        meta.sides,
        ByteSizeIec(disk_size),
        meta.label
    );
    Ok(())
}

fn run(fs: &JasminFileSystem, command: Command) -> Result<(), Box<dyn Error>> {
    let root = fs.root();
    match command {
        Command::Format { .. } => {
            return Err("format does not take a mounted volume".into());
        }
        Command::Ls => {
            for listing in root.contents()? {
                let file = root.file_get(listing.key)?;
                let meta = file.metadata()?;
                let addresses = match meta.kind {
                    FileKind::System { load, run } => format!("{load:#06x} {run:#06x}"),
                    FileKind::Data => String::new(),
                };
                println!(
                    "{:2} {:12} {} {} {:>6} {:>4} {addresses}",
                    listing.key,
                    listing.name,
                    if listing.locked { 'L' } else { 'U' },
                    match listing.ty {
                        FileType::System => 'S',
                        FileType::Data => 'D',
                    },
                    meta.size,
                    listing.blocks,
                );
            }
        }
        Command::Info => {
            let meta = fs.metadata()?;
            println!("label: {}", meta.label);
            println!("sides: {}", meta.sides);
            println!(
                "free:  {} of {} blocks ({})",
                meta.free_blocks,
                meta.total_blocks,
                ByteSizeIec((meta.free_blocks * SECTOR_SIZE) as u64)
            );
        }
        Command::Put {
            source,
            name,
            system,
            load,
            run,
            lock,
        } => {
            let data = fs::read(&source)?;
            let name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or("source has no usable file name")?
                    .to_owned(),
            };
            let kind = match (system, load) {
                (true, Some(load)) => FileKind::System {
                    load,
                    run: run.unwrap_or(load),
                },
                _ => FileKind::Data,
            };
            let key = put(fs, &name, kind, lock, &data)?;
            log::info!("put {name:?} ({} bytes) in slot {key}", data.len());
        }
        Command::Get { name, target } => {
            let file = root.find(&name)?.ok_or(jasmin::Error::NotFound)?;
            let data = file.read_all()?;
            let target = target.unwrap_or_else(|| PathBuf::from(file.entry().name()));
            fs::write(&target, &data)?;
            println!("{} bytes -> {}", data.len(), target.display());
        }
        Command::Rm { name } => {
            let file = root.find(&name)?.ok_or(jasmin::Error::NotFound)?;
            root.file_delete(file.key())?;
        }
        Command::Check => {
            let report = fs.check()?;
            if !report.is_clean() {
                println!("leaked: {:?}", report.leaked);
                println!("shared: {:?}", report.shared);
                println!("marked free: {:?}", report.marked_free);
                for (key, reason) in &report.broken {
                    println!("slot {key}: {reason}");
                }
                return Err("volume is inconsistent".into());
            }
            println!("clean");
        }
    }
    Ok(())
}

/// 写入文件，同名文件被替换。所有检查都在改动卷之前完成，
/// 失败时目录与旧文件保持原样。
fn put(
    fs: &JasminFileSystem,
    name: &str,
    kind: FileKind,
    lock: bool,
    data: &[u8],
) -> Result<u16, Box<dyn Error>> {
    let root = fs.root();
    if !validate_filename(name) {
        return Err(jasmin::Error::InvalidName(name.to_owned()).into());
    }
    if let FileKind::System { load, .. } = kind {
        check_address(load, data.len())?;
    }

    let existing = root.find(name)?;
    let reclaimed = match &existing {
        Some(file) if file.entry().is_locked() => return Err(jasmin::Error::ReadOnly.into()),
        Some(file) => file.chain()?.len(),
        None => 0,
    };
    let needed = blocks_needed(data.len());
    let free = fs.free_block_count()? + reclaimed;
    if free < needed {
        return Err(jasmin::Error::OutOfSpace { needed, free }.into());
    }

    let meta = match kind {
        FileKind::System { load, run } => FileMeta::system(name, load, run),
        FileKind::Data => FileMeta::data(name),
    };
    let (mut file, created) = match existing {
        Some(file) if file.file_type() == kind.file_type() => (file, false),
        // 种类不同时先删除旧文件
        Some(file) => {
            root.file_delete(file.key())?;
            (root.file_create(&meta)?, true)
        }
        None => (root.file_create(&meta)?, true),
    };

    if let Err(err) = file.replace_as(kind, data) {
        if created {
            if let Err(cleanup) = root.file_delete(file.key()) {
                log::warn!("could not remove {name:?} after failed put: {cleanup}");
            }
        }
        return Err(err.into());
    }

    if lock != file.entry().is_locked() {
        let mut meta = file.metadata()?;
        meta.locked = lock;
        file.metadata_change(&meta)?;
    }
    Ok(file.key())
}
