use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use clap::{App, Arg};
use fat_fs::{AccessMode, BlockDevice, DirEntry, FatFileSystem, FsError, BLOCK_COUNT, BLOCK_SZ};
use log::info;

struct BlockFile(Mutex<File>);

impl BlockDevice for BlockFile {
  fn read_block(&self, block_id: usize, buf: &mut [u8]) -> fat_fs::Result<()> {
    if block_id >= BLOCK_COUNT {
      return Err(FsError::IoError);
    }
    let mut file = self.0.lock().map_err(|_| FsError::IoError)?;
    file
      .seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
      .map_err(|_| FsError::IoError)?;
    file.read_exact(buf).map_err(|_| FsError::IoError)
  }

  fn write_block(&self, block_id: usize, buf: &[u8]) -> fat_fs::Result<()> {
    if block_id >= BLOCK_COUNT {
      return Err(FsError::IoError);
    }
    let mut file = self.0.lock().map_err(|_| FsError::IoError)?;
    file
      .seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
      .map_err(|_| FsError::IoError)?;
    file.write_all(buf).map_err(|_| FsError::IoError)
  }
}

fn main() {
  env_logger::init();
  let matches = App::new("fat-shell")
    .about("Command shell over a FAT-chain filesystem image")
    .arg(
      Arg::with_name("image")
        .short("i")
        .long("image")
        .takes_value(true)
        .help("Disk image backing the filesystem (created when missing)"),
    )
    .get_matches();

  let image = matches.value_of("image").unwrap_or("fs.img");
  if let Err(e) = run(image) {
    eprintln!("fat-shell: {}", e);
    std::process::exit(1);
  }
}

fn open_image(path: &str) -> io::Result<Arc<BlockFile>> {
  let file = OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .open(path)?;
  file.set_len((BLOCK_COUNT * BLOCK_SZ) as u64)?;
  Ok(Arc::new(BlockFile(Mutex::new(file))))
}

fn run(image: &str) -> io::Result<()> {
  let dev = open_image(image)?;
  let mut fs = FatFileSystem::open(dev).map_err(fs_to_io)?;
  info!(
    "image {} opened ({} blocks of {} bytes)",
    image, BLOCK_COUNT, BLOCK_SZ
  );

  let stdin = io::stdin();
  let mut lines = stdin.lock().lines();
  loop {
    print!("$ ");
    io::stdout().flush()?;
    let line = match lines.next() {
      Some(line) => line?,
      None => break,
    };
    let args: Vec<&str> = line.split_whitespace().collect();
    if args.is_empty() {
      continue;
    }
    if matches!(args[0], "quit" | "exit") {
      break;
    }
    dispatch(&mut fs, &args, &mut lines)?;
  }
  Ok(())
}

/// Run one command; `0` for success, `-1` for any failure, diagnostics on
/// standard output.
fn dispatch(
  fs: &mut FatFileSystem,
  args: &[&str],
  lines: &mut impl Iterator<Item = io::Result<String>>,
) -> io::Result<i32> {
  let status = match args {
    ["format"] => report(fs.format()),
    ["create", path] => {
      let data = read_payload(lines)?;
      report(fs.create(path, &data))
    }
    ["cat", path] => match fs.read(path) {
      Ok(data) => {
        io::stdout().write_all(&data)?;
        0
      }
      Err(e) => fail(e),
    },
    ["ls"] => match fs.list() {
      Ok(entries) => {
        print_listing(&entries);
        0
      }
      Err(e) => fail(e),
    },
    ["cp", src, dst] => report(fs.copy(src, dst)),
    ["mv", src, dst] => report(fs.rename(src, dst)),
    ["rm", path] => report(fs.remove(path)),
    ["append", src, dst] => report(fs.append(src, dst)),
    ["mkdir", path] => report(fs.mkdir(path)),
    ["cd", path] => report(fs.change_dir(path)),
    ["pwd"] => match fs.working_dir() {
      Ok(path) => {
        println!("{}", path);
        0
      }
      Err(e) => fail(e),
    },
    ["chmod", mode, path] => report(fs.chmod(mode, path)),
    ["help"] => {
      print_help();
      0
    }
    _ => {
      println!("unknown or malformed command, try `help`");
      -1
    }
  };
  Ok(status)
}

fn report(result: fat_fs::Result<()>) -> i32 {
  match result {
    Ok(()) => 0,
    Err(e) => fail(e),
  }
}

fn fail(e: FsError) -> i32 {
  println!("Error: {}", e);
  -1
}

/// Gather a `create` payload: lines up to (not including) the first blank
/// one, each contributing its bytes plus a newline.
fn read_payload(lines: &mut impl Iterator<Item = io::Result<String>>) -> io::Result<Vec<u8>> {
  let mut data = Vec::new();
  for line in lines {
    let line = line?;
    if line.is_empty() {
      break;
    }
    data.extend_from_slice(line.as_bytes());
    data.push(b'\n');
  }
  Ok(data)
}

fn print_listing(entries: &[DirEntry]) {
  println!("name\t type\t accessrights\t size");
  for e in entries {
    let kind = if e.is_dir() { "dir" } else { "file" };
    let size = if e.is_dir() {
      String::from("-")
    } else {
      e.size().to_string()
    };
    println!("{}\t {}\t {}\t {}", e.name(), kind, rights(e.access()), size);
  }
}

fn rights(mode: AccessMode) -> String {
  [
    (AccessMode::READ, 'r'),
    (AccessMode::WRITE, 'w'),
    (AccessMode::EXECUTE, 'x'),
  ]
  .iter()
  .map(|&(bit, c)| if mode.contains(bit) { c } else { '-' })
  .collect()
}

fn print_help() {
  println!("commands:");
  println!("  format                  reinitialize the volume");
  println!("  create <path>           new file, content read until a blank line");
  println!("  cat <path>              print file content");
  println!("  ls                      list the current directory");
  println!("  cp <src> <dst>          copy a file");
  println!("  mv <src> <dst>          move or rename");
  println!("  rm <path>               remove a file or empty directory");
  println!("  append <src> <dst>      append src's content to dst");
  println!("  mkdir <path>            new directory");
  println!("  cd <path>               change the working directory");
  println!("  pwd                     print the working directory");
  println!("  chmod <mode> <path>     set access rights (octal digit)");
  println!("  quit                    leave the shell");
}

fn fs_to_io(e: FsError) -> io::Error {
  io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[test]
fn shell_image_test() -> io::Result<()> {
  std::fs::create_dir_all("target")?;
  let dev = open_image("target/fs-test.img")?;
  let mut fs = FatFileSystem::open(dev.clone()).map_err(fs_to_io)?;
  fs.format().map_err(fs_to_io)?;

  let payload: Vec<u8> = (0..3 * BLOCK_SZ + 17)
    .map(|_| b'0' + rand::random::<u8>() % 10)
    .collect();
  fs.create("blob", &payload).map_err(fs_to_io)?;
  assert_eq!(fs.read("blob").map_err(fs_to_io)?, payload);

  fs.mkdir("sub").map_err(fs_to_io)?;
  fs.change_dir("sub").map_err(fs_to_io)?;
  assert_eq!(fs.working_dir().map_err(fs_to_io)?, "/sub/");
  fs.create("inner", b"kept across reopen\n")
    .map_err(fs_to_io)?;
  drop(fs);

  // a fresh instance sees everything the old one wrote
  let mut fs = FatFileSystem::open(dev).map_err(fs_to_io)?;
  assert_eq!(
    fs.read("/sub/inner").map_err(fs_to_io)?,
    b"kept across reopen\n"
  );
  assert_eq!(fs.read("/blob").map_err(fs_to_io)?, payload);
  fs.remove("/blob").map_err(fs_to_io)?;
  Ok(())
}
