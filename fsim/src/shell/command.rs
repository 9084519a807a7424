//! Executes one parsed [`Command`] against a [`FileSystem`], printing
//! results to stdout and logging the outcome.
//!
//! Grounded in `original_source/filesystem.c`'s `interactive_shell`: each
//! verb resolves its arguments against the current directory, dispatches to
//! a namespace or stream operation, and reports failure inline rather than
//! aborting the session.

use fsim_types::{InodeNo, InodeType, Permissions, Whence};

use crate::error::FsError;
use crate::fs::FileSystem;
use crate::ops;
use crate::{directory, path, stream};

use super::parser::{Command, WriteMode};

/// Resolves `dest_path` relative to `cwd` and requires it to name a
/// directory, the way `cp`/`mv`/`ln`'s destination argument is validated.
fn resolve_directory(fs: &FileSystem, cwd: InodeNo, dest_path: &str) -> Result<InodeNo, String> {
    let target = path::resolve(dest_path, cwd, fs.inodes(), fs.directories())
        .map_err(|e| format!("invalid destination directory: {e}"))?;
    let idx = target.as_index().expect("resolve only returns valid inodes");
    if fs.inodes()[idx].ty() != Some(InodeType::Directory) {
        return Err(format!("{dest_path} is not a directory"));
    }
    Ok(target)
}

/// Runs `cmd` against `fs`, with `cwd` threaded through for commands that
/// change or depend on the current directory. `cmd` is never
/// [`Command::Exit`]; the REPL loop handles that case before dispatch.
pub fn execute(fs: &mut FileSystem, cwd: &mut InodeNo, cmd: Command) {
    match cmd {
        Command::Empty => {}
        Command::Exit => unreachable!("handled by the REPL loop before dispatch"),
        Command::Help => print_help(),
        Command::Ls => list(fs, *cwd),
        Command::Pwd => println!("{}", path::full_path(*cwd, fs.inodes(), fs.directories())),
        Command::Cd(target) => cd(fs, cwd, &target),
        Command::Mkdir(name) => {
            run(fs, |ns| ops::create_directory(ns, name.as_bytes(), *cwd).map(|_| ()))
        }
        Command::Touch(name) => run(fs, |ns| {
            ops::create_file(ns, name.as_bytes(), Permissions::READ | Permissions::WRITE, *cwd)
                .map(|_| ())
        }),
        Command::Rm(name) => run(fs, |ns| ops::delete_file(ns, name.as_bytes(), *cwd)),
        Command::Remdir(name) => run(fs, |ns| ops::delete_directory(ns, name.as_bytes(), *cwd)),
        Command::Cp { src, new_name, dest_path } => cp(fs, *cwd, &src, &new_name, &dest_path),
        Command::Mv { src, dest_path } => mv(fs, *cwd, &src, &dest_path),
        Command::Ln { target, link, dest_path } => ln(fs, *cwd, &target, &link, &dest_path),
        Command::Sym { target_path, link_name } => sym(fs, *cwd, &target_path, &link_name),
        Command::Rfile(name) => rfile(fs, *cwd, &name),
        Command::Wfile { name, mode, text } => wfile(fs, *cwd, &name, mode, &text),
        Command::Stat(name) => stat(fs, *cwd, &name),
        Command::Chmod { name, perms } => {
            run(fs, |ns| ops::change_permissions(ns, name.as_bytes(), perms, *cwd))
        }
        Command::Unknown(raw) => {
            log::warn!("unknown command: {raw}");
            println!("unknown command: {raw}");
        }
    }
}

/// Runs a namespace-only operation and reports its error, if any, without
/// propagating it: a failed command ends the command, not the shell.
fn run(fs: &mut FileSystem, f: impl FnOnce(&mut ops::Namespace<'_>) -> Result<(), FsError>) {
    let mut ns = fs.namespace();
    if let Err(e) = f(&mut ns) {
        log::warn!("command failed: {e}");
        println!("error: {e}");
    }
}

fn cd(fs: &mut FileSystem, cwd: &mut InodeNo, target: &str) {
    match path::resolve(target, *cwd, fs.inodes(), fs.directories()) {
        Ok(inode) => {
            let idx = inode.as_index().expect("resolve only returns valid inodes");
            if fs.inodes()[idx].ty() == Some(InodeType::Directory) {
                *cwd = inode;
            } else {
                println!("error: {target} is not a directory");
            }
        }
        Err(e) => {
            log::warn!("cd {target} failed: {e}");
            println!("error: {e}");
        }
    }
}

fn list(fs: &FileSystem, cwd: InodeNo) {
    let idx = cwd.as_index().expect("current directory is always valid");
    println!("directory contents:");
    for (name, inode) in directory::entries(&fs.directories()[idx]) {
        let iidx = inode.as_index().expect("directory entry always valid");
        let entry = &fs.inodes()[iidx];
        let ty = match entry.ty() {
            Some(InodeType::Directory) => 'd',
            Some(InodeType::File) => 'f',
            Some(InodeType::Symlink) => 'l',
            _ => '?',
        };
        println!(
            "[{ty}{}] {:<20} (inode {inode}, size {} bytes)",
            entry.permissions(),
            String::from_utf8_lossy(name),
            entry.size
        );
    }
}

/// Resolves `src` directly in `cwd`'s own directory record, matching the
/// original's `cp`/`mv`: the source is always a name in the current
/// directory, never an arbitrary path.
fn lookup_in_cwd(fs: &FileSystem, cwd: InodeNo, name: &str) -> Option<InodeNo> {
    let idx = cwd.as_index().expect("current directory is always valid");
    directory::find_inode(name.as_bytes(), &fs.directories()[idx])
}

fn cp(fs: &mut FileSystem, cwd: InodeNo, src: &str, new_name: &str, dest_path: &str) {
    let dest = match resolve_directory(fs, cwd, dest_path) {
        Ok(d) => d,
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };
    let Some(src_inode) = lookup_in_cwd(fs, cwd, src) else {
        println!("error: no such file: {src}");
        return;
    };
    let sidx = src_inode.as_index().expect("found via directory entry");
    let is_dir = fs.inodes()[sidx].ty() == Some(InodeType::Directory);

    let (mut ns, image) = fs.namespace_and_image();
    let result = if is_dir {
        ops::copy_directory(&mut ns, image, src.as_bytes(), new_name.as_bytes(), cwd, dest).map(drop)
    } else {
        ops::copy_file(&mut ns, image, src.as_bytes(), new_name.as_bytes(), cwd, dest).map(drop)
    };
    if let Err(e) = result {
        log::warn!("cp {src} {new_name} {dest_path} failed: {e}");
        println!("error: {e}");
    }
}

fn mv(fs: &mut FileSystem, cwd: InodeNo, src: &str, dest_path: &str) {
    let dest = match resolve_directory(fs, cwd, dest_path) {
        Ok(d) => d,
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };
    let Some(src_inode) = lookup_in_cwd(fs, cwd, src) else {
        println!("error: no such file: {src}");
        return;
    };
    let sidx = src_inode.as_index().expect("found via directory entry");
    let is_dir = fs.inodes()[sidx].ty() == Some(InodeType::Directory);

    run(fs, |ns| {
        if is_dir {
            ops::move_directory(ns, src.as_bytes(), cwd, dest)
        } else {
            ops::move_file(ns, src.as_bytes(), cwd, dest)
        }
    });
}

fn ln(fs: &mut FileSystem, cwd: InodeNo, target: &str, link: &str, dest_path: &str) {
    let dest = match resolve_directory(fs, cwd, dest_path) {
        Ok(d) => d,
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };
    run(fs, |ns| ops::create_hard_link(ns, link.as_bytes(), target.as_bytes(), cwd, dest));
}

fn sym(fs: &mut FileSystem, cwd: InodeNo, target_path: &str, link_name: &str) {
    let (mut ns, image) = fs.namespace_and_image();
    if let Err(e) = ops::create_symbolic_link(&mut ns, image, link_name.as_bytes(), target_path, cwd) {
        log::warn!("sym {target_path} {link_name} failed: {e}");
        println!("error: {e}");
    }
}

fn rfile(fs: &mut FileSystem, cwd: InodeNo, name: &str) {
    let Some(target) = lookup_in_cwd(fs, cwd, name) else {
        println!("error: no such file: {name}");
        return;
    };
    let tidx = target.as_index().expect("found via directory entry");

    let result = match fs.inodes()[tidx].ty() {
        Some(InodeType::File) => {
            let size = fs.inodes()[tidx].size.max(0) as usize;
            let mut buf = vec![0_u8; size];
            let (image, inodes, _open_files) = fs.stream_parts();
            stream::read_via_inode(image, &inodes[tidx], &mut buf).map(|_| buf)
        }
        Some(InodeType::Symlink) => read_symlink_target(fs, cwd, tidx),
        Some(InodeType::Directory) => {
            println!("error: {name} is a directory");
            return;
        }
        None => {
            println!("error: unrecognized type for {name}");
            return;
        }
    };

    match result {
        Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
        Err(e) => {
            log::warn!("rfile {name} failed: {e}");
            println!("error: {e}");
        }
    }
}

/// Reads a symlink's own stored path, resolves it, then reads the target
/// inode's content directly — equivalent to the original's re-open-by-name
/// dance, but expressed against inodes instead of file descriptors.
fn read_symlink_target(fs: &mut FileSystem, cwd: InodeNo, link_idx: usize) -> Result<Vec<u8>, FsError> {
    let link_size = fs.inodes()[link_idx].size.max(0) as usize;
    let mut link_buf = vec![0_u8; link_size];
    {
        let (image, inodes, _open_files) = fs.stream_parts();
        stream::read_via_inode(image, &inodes[link_idx], &mut link_buf)?;
    }
    let target_path = String::from_utf8_lossy(&link_buf)
        .trim_end_matches('\0')
        .to_string();

    let target = path::resolve(&target_path, cwd, fs.inodes(), fs.directories())?;
    let target_idx = target.as_index().expect("resolve only returns valid inodes");
    if fs.inodes()[target_idx].ty() != Some(InodeType::File) {
        return Err(FsError::WrongType(format!("{target} is not a file")));
    }

    let size = fs.inodes()[target_idx].size.max(0) as usize;
    let mut buf = vec![0_u8; size];
    let (image, inodes, _open_files) = fs.stream_parts();
    stream::read_via_inode(image, &inodes[target_idx], &mut buf)?;
    Ok(buf)
}

fn wfile(fs: &mut FileSystem, cwd: InodeNo, name: &str, mode: WriteMode, text: &str) {
    if let Err(e) = wfile_inner(fs, cwd, name, mode, text) {
        log::warn!("wfile {name} failed: {e}");
        println!("error: {e}");
    }
}

fn wfile_inner(
    fs: &mut FileSystem,
    cwd: InodeNo,
    name: &str,
    mode: WriteMode,
    text: &str,
) -> Result<(), FsError> {
    let (inodes, directories, open_files) = fs.open_parts();
    let fd = stream::open(inodes, directories, open_files, name.as_bytes(), cwd)?;

    let whence = match mode {
        WriteMode::Rewrite => Whence::Start,
        WriteMode::Add => Whence::End,
    };
    let (inodes, _directories, open_files) = fs.open_parts();
    stream::seek(inodes, open_files, fd, 0, whence)?;

    let (image, inodes, bitmap, open_files) = fs.stream_parts_mut();
    stream::write(image, inodes, bitmap, open_files, fd, text.as_bytes())?;

    stream::close(fs.open_files_mut(), fd)?;
    Ok(())
}

fn stat(fs: &FileSystem, cwd: InodeNo, name: &str) {
    let Some(target) = lookup_in_cwd(fs, cwd, name) else {
        println!("error: no such file: {name}");
        return;
    };
    let tidx = target.as_index().expect("found via directory entry");
    let entry = &fs.inodes()[tidx];
    println!("information for '{name}':");
    println!("  inode: {target}");
    println!(
        "  type: {}",
        entry.ty().map_or_else(|| "unknown".to_string(), |t| t.to_string())
    );
    println!("  size: {} bytes", entry.size);
    println!("  permissions: {}", entry.permissions());
    println!("  links: {}", entry.link_count);
    println!("  created: {}", entry.creation_time);
    println!("  modified: {}", entry.modification_time);
}

fn print_help() {
    println!("available commands:");
    println!("  cd <path>                        change directory");
    println!("  chmod <file> <perms>             change permissions (e.g. rwx, r--)");
    println!("  cp <src> <newname> <dest_path>   copy a file or directory");
    println!("  exit                             leave the shell");
    println!("  help                             show this message");
    println!("  ln <file> <link> <path>          create a hard link in <path>");
    println!("  ls                               list the current directory");
    println!("  mkdir <dir>                      create a directory");
    println!("  mv <src> <dest_path>             move a file or directory");
    println!("  pwd                              print the current directory");
    println!("  remdir <dir>                     recursively remove a directory");
    println!("  rm <file>                        remove a file");
    println!("  rfile <file>                     print a file's contents");
    println!("  stat <file>                      print inode metadata");
    println!("  sym <target_path> <link>         create a symbolic link");
    println!("  touch <file>                     create an empty file");
    println!("  wfile <file> <mode> <text>       write to a file (add, rewrite)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser;

    fn fresh_fs() -> (FileSystem, InodeNo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystem::open(&dir.path().join("fs.img"), false).unwrap();
        let cwd = fs.current_dir();
        (fs, cwd, dir)
    }

    fn exec(fs: &mut FileSystem, cwd: &mut InodeNo, line: &str) {
        execute(fs, cwd, parser::parse(line));
    }

    #[test]
    fn touch_write_read_round_trips_through_the_shell() {
        let (mut fs, mut cwd, _dir) = fresh_fs();
        exec(&mut fs, &mut cwd, "touch a");
        exec(&mut fs, &mut cwd, "wfile a rewrite hello");

        let a = lookup_in_cwd(&fs, cwd, "a").unwrap();
        let idx = a.as_index().unwrap();
        assert_eq!(fs.inodes()[idx].size, 5);

        exec(&mut fs, &mut cwd, "wfile a add  world");
        assert_eq!(fs.inodes()[idx].size, 11);
    }

    #[test]
    fn hard_link_then_rm_leaves_the_other_name_readable() {
        let (mut fs, mut cwd, _dir) = fresh_fs();
        exec(&mut fs, &mut cwd, "touch a");
        exec(&mut fs, &mut cwd, "wfile a rewrite hello world");
        exec(&mut fs, &mut cwd, "ln a b /home");
        let idx = cwd.as_index().unwrap();
        let a = directory::find_inode(b"a", &fs.directories()[idx]).unwrap();
        assert_eq!(fs.inodes()[a.as_index().unwrap()].link_count, 2);

        exec(&mut fs, &mut cwd, "rm a");
        assert!(directory::find_inode(b"a", &fs.directories()[idx]).is_none());
        let b = directory::find_inode(b"b", &fs.directories()[idx]).unwrap();
        assert!(!fs.inodes()[b.as_index().unwrap()].is_free());
        assert_eq!(fs.inodes()[b.as_index().unwrap()].size, 11);
    }

    #[test]
    fn mkdir_cp_then_remdir_cleans_up_both() {
        let (mut fs, mut cwd, _dir) = fresh_fs();
        exec(&mut fs, &mut cwd, "touch a");
        exec(&mut fs, &mut cwd, "wfile a rewrite hello world");
        exec(&mut fs, &mut cwd, "mkdir d");
        exec(&mut fs, &mut cwd, "cp a x d");

        let didx = cwd.as_index().unwrap();
        let d = directory::find_inode(b"d", &fs.directories()[didx]).unwrap();
        let x = directory::find_inode(b"x", &fs.directories()[d.as_index().unwrap()]).unwrap();
        assert_eq!(fs.inodes()[x.as_index().unwrap()].size, 11);

        exec(&mut fs, &mut cwd, "remdir d");
        assert!(directory::find_inode(b"d", &fs.directories()[didx]).is_none());
    }

    #[test]
    fn sym_then_rfile_dereferences_the_target() {
        let (mut fs, mut cwd, _dir) = fresh_fs();
        exec(&mut fs, &mut cwd, "touch b");
        exec(&mut fs, &mut cwd, "wfile b rewrite hello world");
        exec(&mut fs, &mut cwd, "sym /home/b ls");

        let idx = cwd.as_index().unwrap();
        let link = directory::find_inode(b"ls", &fs.directories()[idx]).unwrap();
        assert_eq!(fs.inodes()[link.as_index().unwrap()].ty(), Some(InodeType::Symlink));

        let bytes = read_symlink_target(&mut fs, cwd, link.as_index().unwrap()).unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn cd_into_child_then_pwd_reports_the_new_path() {
        let (mut fs, mut cwd, _dir) = fresh_fs();
        exec(&mut fs, &mut cwd, "mkdir sub");
        exec(&mut fs, &mut cwd, "cd sub");
        assert_eq!(path::full_path(cwd, fs.inodes(), fs.directories()), "/home/sub");
        assert_ne!(cwd, fs.current_dir());
    }

    #[test]
    fn chmod_updates_the_permission_triple() {
        let (mut fs, mut cwd, _dir) = fresh_fs();
        exec(&mut fs, &mut cwd, "touch a");
        exec(&mut fs, &mut cwd, "chmod a r--");
        let a = lookup_in_cwd(&fs, cwd, "a").unwrap();
        assert_eq!(fs.inodes()[a.as_index().unwrap()].permissions(), Permissions::READ);
    }
}
