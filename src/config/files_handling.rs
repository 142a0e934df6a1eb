
// imports
use crate::cache::MatrixMeta;
use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::vocab::Vocabulary;

use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;


pub fn read_input<R: ReadFile>(input_dir: &Path, file_name: &str) -> Result<R> {
    R::read_file(&artifact_path::<R>(input_dir, file_name))
}

pub fn save_output<S: SaveFile>(output_dir: &Path, file_name: &str, item: &S) -> Result<()> {
    item.save_file(&artifact_path::<S>(output_dir, file_name))
}

/// `{dir}/{file_name}.{extension of T}`
pub fn artifact_path<T: FileKind>(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!("{}.{}", file_name, T::EXTENSION))
}

pub trait FileKind {
    const EXTENSION: &'static str;
}

pub trait ReadFile: FileKind + Sized {
    fn read_file(file_path: &Path) -> Result<Self>;
}

pub trait SaveFile: FileKind {
    fn save_file(&self, file_path: &Path) -> Result<()>;
}


/// Writes `file_path` through a temporary file in the same directory that is
/// renamed into place once complete, so readers never see a partial file.
pub fn write_atomic<F>(file_path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
{
    let dir = match file_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        write(&mut writer)?;
        writer.flush().map_err(|e| Error::io(file_path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::io(file_path, e))?;
    tmp.persist(file_path).map_err(|e| Error::io(file_path, e.error))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let f = BufReader::new(File::open(file_path).map_err(|e| Error::io(file_path, e))?);
    serde_json::from_reader(f).map_err(|e| Error::json(file_path, e))
}

pub fn write_json<T: Serialize + ?Sized>(file_path: &Path, item: &T) -> Result<()> {
    write_atomic(file_path, |writer| {
        serde_json::to_writer(&mut *writer, item).map_err(|e| Error::json(file_path, e))
    })
}


impl FileKind for Array2<f32> {
    const EXTENSION: &'static str = "npy";
}

impl ReadFile for Array2<f32> {
    fn read_file(file_path: &Path) -> Result<Self> {
        let f = BufReader::new(File::open(file_path).map_err(|e| Error::io(file_path, e))?);
        Array2::<f32>::read_npy(f).map_err(|source| Error::NpyRead { path: file_path.to_path_buf(), source })
    }
}

impl SaveFile for Array2<f32> {
    fn save_file(&self, file_path: &Path) -> Result<()> {
        write_atomic(file_path, |writer| {
            self.write_npy(&mut *writer)
                .map_err(|source| Error::NpyWrite { path: file_path.to_path_buf(), source })
        })
    }
}

impl FileKind for Vocabulary {
    const EXTENSION: &'static str = "json";
}

impl ReadFile for Vocabulary {
    fn read_file(file_path: &Path) -> Result<Self> {
        read_json(file_path)
    }
}

impl SaveFile for Vocabulary {
    fn save_file(&self, file_path: &Path) -> Result<()> {
        write_json(file_path, self)
    }
}

impl FileKind for MatrixMeta {
    const EXTENSION: &'static str = "json";
}

impl ReadFile for MatrixMeta {
    fn read_file(file_path: &Path) -> Result<Self> {
        read_json(file_path)
    }
}

impl SaveFile for MatrixMeta {
    fn save_file(&self, file_path: &Path) -> Result<()> {
        write_json(file_path, self)
    }
}

impl FileKind for Corpus {
    const EXTENSION: &'static str = "json";
}

impl ReadFile for Corpus {
    fn read_file(file_path: &Path) -> Result<Self> {
        read_json(file_path)
    }
}

impl SaveFile for Corpus {
    fn save_file(&self, file_path: &Path) -> Result<()> {
        write_json(file_path, self)
    }
}
