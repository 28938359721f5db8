//! Construction, retry decay, run reporting and teardown of the segmented
//! buffer against the simulated platform pool.

use dmabuf_engine::{AllocError, DmaBuffer, PAGE_SIZE};
use dmabuf_sim::SimDma;

const fn pages(n: u64) -> u64 {
    n * PAGE_SIZE
}

#[test]
fn bounded_grants_still_deliver_the_exact_size() {
    let dma = SimDma::new();
    dma.set_max_contiguous(pages(8));

    let buffer = DmaBuffer::alloc(dma.clone(), pages(10)).unwrap();

    assert_eq!(buffer.total_size(), pages(10));
    assert_eq!(buffer.segment_count(), 2);
    assert_eq!(dma.outstanding_bytes(), pages(10));
}

#[test]
fn adjacent_grants_coalesce_into_one_run() {
    let dma = SimDma::new();
    dma.set_max_contiguous(pages(8));

    let buffer = DmaBuffer::alloc(dma, pages(10)).unwrap();

    let runs = buffer.contiguous_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].size, pages(10));
}

#[test]
fn an_address_hole_splits_the_run_report() {
    let dma = SimDma::new();
    dma.set_max_contiguous(pages(8));
    dma.set_address_gap(PAGE_SIZE);

    let buffer = DmaBuffer::alloc(dma, pages(10)).unwrap();

    let runs = buffer.contiguous_runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].size, pages(8));
    assert_eq!(runs[1].size, pages(2));
    assert_eq!(
        runs[0].device_address.checked_add(pages(9)),
        Some(runs[1].device_address)
    );
}

#[test]
fn refused_requests_decay_until_the_pool_accepts() {
    let dma = SimDma::new();
    dma.fail_requests_over(pages(16));

    let buffer = DmaBuffer::alloc(dma.clone(), pages(64)).unwrap();

    // 64 and 32 pages refused, then four grants of 16 pages each.
    assert_eq!(buffer.segment_count(), 4);
    assert_eq!(buffer.total_size(), pages(64));
    assert_eq!(dma.attempts(), 6);
    assert_eq!(buffer.contiguous_runs().len(), 1);
}

#[test]
fn zero_and_unaligned_sizes_are_rejected_up_front() {
    let dma = SimDma::new();

    assert_eq!(
        DmaBuffer::alloc(dma.clone(), 0).err(),
        Some(AllocError::InvalidArgument { size: 0 })
    );
    assert_eq!(
        DmaBuffer::alloc(dma.clone(), pages(1) + 1).err(),
        Some(AllocError::InvalidArgument { size: pages(1) + 1 })
    );
    assert_eq!(dma.attempts(), 0);
}

#[test]
fn a_mid_construction_failure_releases_every_grant() {
    let dma = SimDma::new();
    dma.set_max_contiguous(pages(4));
    dma.fail_after_grants(1);

    let err = DmaBuffer::alloc(dma.clone(), pages(16)).err().unwrap();

    assert_eq!(
        err,
        AllocError::Exhausted {
            remaining: pages(12)
        }
    );
    assert_eq!(dma.outstanding_bytes(), 0);
    assert_eq!(dma.total_allocated(), pages(4));
    assert_eq!(dma.total_freed(), pages(4));
}

#[test]
fn dropping_the_buffer_returns_every_byte() {
    let dma = SimDma::new();
    dma.set_max_contiguous(pages(3));

    let buffer = DmaBuffer::alloc(dma.clone(), pages(10)).unwrap();
    assert_eq!(dma.outstanding_bytes(), pages(10));

    drop(buffer);
    assert_eq!(dma.outstanding_bytes(), 0);
    assert_eq!(dma.total_allocated(), dma.total_freed());
}
