//! Binary persistence for vectors and matrices.
//!
//! The on-disk layout is process-count independent: data is funneled
//! through rank 0 in global order at store time and redistributed by the
//! reader's own layout at load time, so a file written on one communicator
//! size loads on any other.
//!
//! Layout (little endian): a `u32` class id, then object-dependent sizes
//! and payload. Vectors are `[id][n][values]`; matrices are
//! `[id][rows][cols][nnz][per-row counts][column indices][values]`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::Error;
use crate::matrix::dist::DistMatrix;
use crate::parallel::Comm;
use crate::vector::dist::{DistVector, InsertMode};
use crate::vector::layout::Layout;

pub const VEC_CLASSID: u32 = 1211214;
pub const MAT_CLASSID: u32 = 1211216;

fn write_u32(w: &mut impl Write, v: u32) -> Result<(), Error> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u64(w: &mut impl Write, v: u64) -> Result<(), Error> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_f64(w: &mut impl Write, v: f64) -> Result<(), Error> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_u32(r: &mut impl Read) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> Result<u64, Error> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> Result<f64, Error> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn expect_classid(r: &mut impl Read, want: u32) -> Result<(), Error> {
    let got = read_u32(r)?;
    if got != want {
        return Err(Error::NumericalError(format!(
            "bad class id in binary file: expected {want}, found {got}"
        )));
    }
    Ok(())
}

/// Write a vector, rank 0 holding the file handle.
pub fn store_vector(path: impl AsRef<Path>, v: &DistVector) -> Result<(), Error> {
    let comm = v.layout().comm().clone();
    let rank = comm.rank();

    // Funnel local values to rank 0; exchange results arrive rank-ordered,
    // which with contiguous ownership is exactly global order.
    let mut sends: Vec<Vec<f64>> = vec![Vec::new(); comm.size()];
    sends[0] = v.array()?.to_vec();
    let received = comm.exchange_scalars(&sends);

    if rank == 0 {
        let mut w = BufWriter::new(File::create(path)?);
        write_u32(&mut w, VEC_CLASSID)?;
        write_u64(&mut w, v.global_len() as u64)?;
        for part in &received {
            for &x in part {
                write_f64(&mut w, x)?;
            }
        }
        w.flush()?;
    }
    comm.barrier();
    Ok(())
}

/// Read a vector written by [`store_vector`], partitioned over `comm` by
/// the automatic splitting rule.
pub fn load_vector(path: impl AsRef<Path>, comm: Arc<dyn Comm>) -> Result<DistVector, Error> {
    let rank = comm.rank();
    let size = comm.size();

    let mut sends: Vec<Vec<f64>> = vec![Vec::new(); size];
    let mut n_global = vec![0usize];
    if rank == 0 {
        let mut r = BufReader::new(File::open(path)?);
        expect_classid(&mut r, VEC_CLASSID)?;
        let n = read_u64(&mut r)? as usize;
        n_global[0] = n;
        let mut remaining = Vec::with_capacity(n);
        for _ in 0..n {
            remaining.push(read_f64(&mut r)?);
        }
        let mut offset = 0;
        for (dest_rank, dest) in sends.iter_mut().enumerate() {
            let (_, len) = crate::vector::layout::split_ownership(dest_rank, size, n);
            dest.extend_from_slice(&remaining[offset..offset + len]);
            offset += len;
        }
    }
    // Size travels with the index exchange so every rank can build the
    // layout.
    let mut size_sends: Vec<Vec<usize>> = vec![Vec::new(); size];
    if rank == 0 {
        for dest in size_sends.iter_mut() {
            dest.push(n_global[0]);
        }
    }
    let sizes = comm.exchange_indices(&size_sends);
    let n = sizes[0]
        .first()
        .copied()
        .ok_or(Error::InvalidState("vector size missing from load exchange"))?;

    let received = comm.exchange_scalars(&sends);
    let layout = Layout::new(comm, None, Some(n))?;
    let mut v = DistVector::new(layout);
    v.array_mut()?.copy_from_slice(&received[0]);
    Ok(v)
}

/// Write a matrix in global row order through rank 0.
pub fn store_matrix(path: impl AsRef<Path>, a: &DistMatrix) -> Result<(), Error> {
    let comm = a.row_layout().comm().clone();
    let rank = comm.rank();
    let (row_start, row_end) = a.row_layout().local_range();

    // Per-row counts and flattened column/value arrays for the funnel.
    let mut counts = Vec::with_capacity(row_end - row_start);
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    for row in row_start..row_end {
        let entries = a.local_row(row)?;
        counts.push(entries.len());
        for (c, v) in entries {
            cols.push(c);
            vals.push(v);
        }
    }

    let size = comm.size();
    let mut idx_sends: Vec<Vec<usize>> = vec![Vec::new(); size];
    let mut val_sends: Vec<Vec<f64>> = vec![Vec::new(); size];
    // The local row count leads the payload; layouts need not follow the
    // automatic split, so rank 0 cannot reconstruct it.
    let mut packed = Vec::with_capacity(1 + counts.len() + cols.len());
    packed.push(counts.len());
    packed.extend_from_slice(&counts);
    packed.extend_from_slice(&cols);
    idx_sends[0] = packed;
    val_sends[0] = vals;
    let idx_received = comm.exchange_indices(&idx_sends);
    let val_received = comm.exchange_scalars(&val_sends);

    if rank == 0 {
        let nrows = a.global_rows();
        let ncols = a.global_cols();
        let mut all_counts = Vec::with_capacity(nrows);
        let mut all_cols = Vec::new();
        let mut all_vals = Vec::new();
        for (r, part) in idx_received.iter().enumerate() {
            let (&rows_here, rest) = part
                .split_first()
                .ok_or(Error::InvalidState("matrix row count missing from store exchange"))?;
            let (cnts, cs) = rest.split_at(rows_here);
            all_counts.extend_from_slice(cnts);
            all_cols.extend_from_slice(cs);
            all_vals.extend_from_slice(&val_received[r]);
        }
        let nnz = all_cols.len();

        let mut w = BufWriter::new(File::create(path)?);
        write_u32(&mut w, MAT_CLASSID)?;
        write_u64(&mut w, nrows as u64)?;
        write_u64(&mut w, ncols as u64)?;
        write_u64(&mut w, nnz as u64)?;
        for &c in &all_counts {
            write_u64(&mut w, c as u64)?;
        }
        for &c in &all_cols {
            write_u64(&mut w, c as u64)?;
        }
        for &v in &all_vals {
            write_f64(&mut w, v)?;
        }
        w.flush()?;
    }
    comm.barrier();
    Ok(())
}

/// Read a matrix written by [`store_matrix`], repartitioned over `comm`.
pub fn load_matrix(path: impl AsRef<Path>, comm: Arc<dyn Comm>) -> Result<DistMatrix, Error> {
    let rank = comm.rank();
    let size = comm.size();

    // Rank 0 parses the file and routes each rank its row span; sizes ride
    // in front of the per-rank index payload.
    let mut idx_sends: Vec<Vec<usize>> = vec![Vec::new(); size];
    let mut val_sends: Vec<Vec<f64>> = vec![Vec::new(); size];
    if rank == 0 {
        let mut r = BufReader::new(File::open(path)?);
        expect_classid(&mut r, MAT_CLASSID)?;
        let nrows = read_u64(&mut r)? as usize;
        let ncols = read_u64(&mut r)? as usize;
        let nnz = read_u64(&mut r)? as usize;
        let mut counts = Vec::with_capacity(nrows);
        for _ in 0..nrows {
            counts.push(read_u64(&mut r)? as usize);
        }
        let mut cols = Vec::with_capacity(nnz);
        for _ in 0..nnz {
            cols.push(read_u64(&mut r)? as usize);
        }
        let mut vals = Vec::with_capacity(nnz);
        for _ in 0..nnz {
            vals.push(read_f64(&mut r)?);
        }

        let mut row = 0;
        let mut entry = 0;
        for (dest_rank, (idx_dest, val_dest)) in
            idx_sends.iter_mut().zip(val_sends.iter_mut()).enumerate()
        {
            let (_, rows_here) = crate::vector::layout::split_ownership(dest_rank, size, nrows);
            let here: usize = counts[row..row + rows_here].iter().sum();
            idx_dest.push(nrows);
            idx_dest.push(ncols);
            idx_dest.extend_from_slice(&counts[row..row + rows_here]);
            idx_dest.extend_from_slice(&cols[entry..entry + here]);
            val_dest.extend_from_slice(&vals[entry..entry + here]);
            row += rows_here;
            entry += here;
        }
    }
    let idx_received = comm.exchange_indices(&idx_sends);
    let val_received = comm.exchange_scalars(&val_sends);
    let part = &idx_received[0];
    if part.len() < 2 {
        return Err(Error::InvalidState("matrix sizes missing from load exchange"));
    }
    let (nrows, ncols) = (part[0], part[1]);

    let mut a = DistMatrix::create(comm, None, None, Some(nrows), Some(ncols))?;
    let (row_start, row_end) = a.row_layout().local_range();
    let rows_here = row_end - row_start;
    let counts = &part[2..2 + rows_here];
    let cols = &part[2 + rows_here..];
    let vals = &val_received[0];

    let mut entry = 0;
    for (i, &cnt) in counts.iter().enumerate() {
        let row = row_start + i;
        for k in 0..cnt {
            a.set_values(&[row], &[cols[entry + k]], &[vals[entry + k]], InsertMode::Insert)?;
        }
        entry += cnt;
    }
    let h = a.assembly_begin()?;
    a.assembly_end(h)?;
    Ok(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("petrel-viewer-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn vector_round_trip() {
        let layout = Layout::serial(5);
        let v = DistVector::from_fn(layout, |i| i as f64 * 1.5 - 2.0);
        let path = tmp("vec");
        store_vector(&path, &v).unwrap();
        let w = load_vector(&path, Arc::new(crate::parallel::SerialComm)).unwrap();
        assert_eq!(v.array().unwrap(), w.array().unwrap());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn matrix_round_trip() {
        let a = DistMatrix::serial_from_triplets(
            3,
            3,
            &[(0, 0, 2.0), (0, 2, -1.0), (1, 1, 3.0), (2, 0, -1.0), (2, 2, 4.0)],
        )
        .unwrap();
        let path = tmp("mat");
        store_matrix(&path, &a).unwrap();
        let b = load_matrix(&path, Arc::new(crate::parallel::SerialComm)).unwrap();
        assert_eq!(b.global_rows(), 3);
        assert_eq!(b.global_cols(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(a.local_entry(i, j).unwrap(), b.local_entry(i, j).unwrap());
            }
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn store_accepts_uneven_layouts() {
        // Rank 0 owns three of four rows, so the file funnel cannot assume
        // the automatic split when reassembling global row order.
        let path = tmp("uneven");
        let handles: Vec<_> = crate::parallel::local::ThreadComm::group(2)
            .into_iter()
            .map(|comm| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let rank = comm.rank();
                    let comm: Arc<dyn Comm> = comm;
                    let local = if rank == 0 { 3 } else { 1 };
                    let mut a =
                        DistMatrix::create(comm, Some(local), Some(local), Some(4), Some(4))
                            .unwrap();
                    if rank == 0 {
                        for row in 0..3 {
                            a.set_values(&[row], &[row], &[(row + 1) as f64], InsertMode::Insert)
                                .unwrap();
                        }
                        a.set_values(&[2], &[0], &[-1.0], InsertMode::Insert).unwrap();
                    } else {
                        a.set_values(&[3], &[3], &[4.0], InsertMode::Insert).unwrap();
                    }
                    let h = a.assembly_begin().unwrap();
                    a.assembly_end(h).unwrap();
                    store_matrix(&path, &a).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let b = load_matrix(&path, Arc::new(crate::parallel::SerialComm)).unwrap();
        for i in 0..4 {
            assert_eq!(b.local_entry(i, i).unwrap(), (i + 1) as f64);
        }
        assert_eq!(b.local_entry(2, 0).unwrap(), -1.0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn wrong_classid_is_rejected() {
        let layout = Layout::serial(2);
        let v = DistVector::from_fn(layout, |i| i as f64);
        let path = tmp("cross");
        store_vector(&path, &v).unwrap();
        let err = load_matrix(&path, Arc::new(crate::parallel::SerialComm)).unwrap_err();
        assert!(matches!(err, Error::NumericalError(_)));
        std::fs::remove_file(&path).unwrap();
    }
}
